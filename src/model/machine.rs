//! Machine Classification Rule
//!
//! Per-machine mapping from tag names to status/production-count meaning,
//! with comma-separated raw value sets for UP, DOWN and IDLE.

use crate::config::params::{extract_optional_text, extract_text};
use crate::config::RecordConfig;
use crate::error::ConfigError;
use crate::model::{attr, Record, RecordType};
use crate::util::validate_required_properties;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_TAG: &str = "machineStatusTagName";
pub const STATUS_UP_VALUE: &str = "machineStatusUpValue";
pub const STATUS_DOWN_VALUE: &str = "machineStatusDownValue";
pub const STATUS_IDLE_VALUE: &str = "machineStatusIdleValue";
pub const PRODUCTION_COUNT_TAG: &str = "machineProductionCountTagName";

/// Canonical machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MachineStatus {
    Up,
    Down,
    Idle,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Idle => "IDLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            "IDLE" => Some(Self::Idle),
            _ => None,
        }
    }
}

/// A comma-separated list of raw values, trimmed, blanks dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSet(Vec<String>);

impl ValueSet {
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        self.0.iter().any(|v| v == candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub machine_id: String,
    pub status_tag: Option<String>,
    pub up_values: ValueSet,
    pub down_values: ValueSet,
    pub idle_values: ValueSet,
    pub production_count_tag: Option<String>,
}

impl RecordConfig for MachineConfig {
    fn from_record(record: &Record) -> Result<Self, ConfigError> {
        validate_required_properties(record, &[attr::ID])?;

        let config = Self {
            machine_id: extract_text(record, attr::ID),
            status_tag: extract_optional_text(record, STATUS_TAG),
            up_values: ValueSet::parse(&extract_text(record, STATUS_UP_VALUE)),
            down_values: ValueSet::parse(&extract_text(record, STATUS_DOWN_VALUE)),
            idle_values: ValueSet::parse(&extract_text(record, STATUS_IDLE_VALUE)),
            production_count_tag: extract_optional_text(record, PRODUCTION_COUNT_TAG),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.status_tag.is_some()
            && self.up_values.is_empty()
            && self.down_values.is_empty()
            && self.idle_values.is_empty()
        {
            return Err(ConfigError::InvalidProperty {
                property: STATUS_TAG.to_string(),
                reason: "a status tag needs at least one UP, DOWN or IDLE value".to_string(),
            });
        }

        Ok(())
    }
}

impl MachineConfig {
    pub fn is_status_tag(&self, attribute: &str) -> bool {
        self.status_tag.as_deref() == Some(attribute)
    }

    pub fn is_production_count_tag(&self, attribute: &str) -> bool {
        self.production_count_tag.as_deref() == Some(attribute)
    }

    /// The empty rule written the first time a machine id is seen.
    pub fn default_attributes() -> Vec<(String, Value)> {
        vec![
            (attr::TYPE.to_string(), Value::from(RecordType::MachineConfig.as_str())),
            (STATUS_TAG.to_string(), Value::from("")),
            (STATUS_UP_VALUE.to_string(), Value::from("")),
            (STATUS_DOWN_VALUE.to_string(), Value::from("")),
            (STATUS_IDLE_VALUE.to_string(), Value::from("")),
            (PRODUCTION_COUNT_TAG.to_string(), Value::from("")),
        ]
    }
}
