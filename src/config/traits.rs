use crate::error::ConfigError;
use crate::model::Record;

/// Typed configuration built from a store record.
pub trait RecordConfig: Sized {
    fn from_record(record: &Record) -> Result<Self, ConfigError>;
    fn validate(&self) -> Result<(), ConfigError> { Ok(()) }
}
