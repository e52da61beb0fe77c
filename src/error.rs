//! Error Types
//!
//! Typed failures for the library surface. Record-level failures
//! (`ConfigError`, `ClassificationError`) are logged and skipped by their
//! callers; `EnvError` and `StoreError` are surfaced to the invocation.

use thiserror::Error;

/// A configuration record that cannot be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required property '{0}' is missing or blank")]
    MissingProperty(String),

    #[error("property '{property}' has an invalid value: {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("unsupported configuration record type '{0}'")]
    UnsupportedType(String),
}

/// A raw message that cannot be decoded or matched to a message format.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no registered message format matches the payload")]
    NoMatchingFormat,

    #[error("message {index} is malformed: {reason}")]
    MalformedMessage { index: usize, reason: String },
}

/// Invalid environment-supplied settings. Fatal for the invocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("'{value}' is not a valid integer")]
    NotAnInteger { value: String },

    #[error("{value} is below the minimum of {minimum}")]
    BelowMinimum { value: i64, minimum: i64 },

    #[error("environment variable '{name}' is not set")]
    Missing { name: String },

    #[error("environment variable '{name}' must be 'Yes' or 'No', got '{value}'")]
    InvalidToggle { name: String, value: String },

    #[error("environment variable '{name}' is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: Box<EnvError>,
    },
}

/// Failures reported by a key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("item is missing key attribute '{0}'")]
    MissingKey(String),

    #[error("batch of {0} items exceeds the per-request limit of {1}")]
    BatchTooLarge(usize, usize),

    #[error("invalid continuation token '{0}'")]
    InvalidContinuation(String),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot is corrupt: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Failures of the read-side chunk query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("window end {end} is before window start {start}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("window of {seconds}s exceeds the limit of {limit}s")]
    WindowTooLarge { seconds: i64, limit: i64 },

    #[error("machine id must not be blank")]
    BlankId,

    #[error(transparent)]
    Store(#[from] StoreError),
}
