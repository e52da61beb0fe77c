//! Data Model
//!
//! Typed views over the configuration records and the values produced by
//! parsing and aggregation. Records travel through the store as plain
//! attribute maps; the types here are built from them on demand.

pub mod chunk;
pub mod format;
pub mod machine;
pub mod observation;

pub use chunk::{Chunk, StatusValue};
pub use format::MessageFormat;
pub use machine::{MachineConfig, MachineStatus, ValueSet};
pub use observation::{Observation, ObservationKind};

use serde_json::Value;
use std::collections::HashMap;

/// A store item: attribute name to JSON value.
pub type Record = HashMap<String, Value>;

/// Attribute names shared by every table.
pub mod attr {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const NAME: &str = "name";
    pub const TIMESTAMP: &str = "timestamp";
    pub const VALUE: &str = "value";
    pub const STATUS: &str = "status";
    pub const TTL: &str = "ttl";
    pub const GENERATION: &str = "generation";

    pub const UI_LOCATION_KEYS: &str = "uiReferenceMappingLocationKeys";
    pub const UI_LINE_KEYS: &str = "uiReferenceMappingLineKeys";
}

/// Id of the singleton records (default message format, UI mapping, cache marker).
pub const DEFAULT_ID: &str = "DEFAULT";

/// The `type` attribute of configuration and reference records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    MessageFormat,
    MachineConfig,
    CacheGeneration,
    UiReferenceMapping,
    Machine,
    Other(String),
}

impl RecordType {
    pub fn parse(s: &str) -> Self {
        match s {
            "MESSAGE_FORMAT" => Self::MessageFormat,
            "MACHINE_CONFIG" => Self::MachineConfig,
            "CACHE_GENERATION" => Self::CacheGeneration,
            "UI_REFERENCE_MAPPING" => Self::UiReferenceMapping,
            "MACHINE" => Self::Machine,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::MessageFormat => "MESSAGE_FORMAT",
            Self::MachineConfig => "MACHINE_CONFIG",
            Self::CacheGeneration => "CACHE_GENERATION",
            Self::UiReferenceMapping => "UI_REFERENCE_MAPPING",
            Self::Machine => "MACHINE",
            Self::Other(s) => s,
        }
    }

    /// Reads the `type` attribute of a record.
    pub fn of(record: &Record) -> Option<Self> {
        record
            .get(attr::TYPE)
            .and_then(Value::as_str)
            .map(Self::parse)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads a string attribute, if present.
pub fn text_attr<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}
