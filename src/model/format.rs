//! Message Format Descriptor
//!
//! Describes where the sub-messages, alias, quality, value and timestamp
//! live inside a site-specific payload, and how the alias splits into a
//! machine id and an attribute name.

use crate::config::params::{extract_attr, extract_text};
use crate::config::RecordConfig;
use crate::error::ConfigError;
use crate::model::{attr, Record};
use crate::util::validate_required_properties;

use chrono::format::{Item, ParseErrorKind, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MESSAGES_KEY: &str = "msgFormatDataMessagesKeyName";
pub const ALIAS_KEY: &str = "msgFormatDataMessageAliasKeyName";
pub const QUALITY_KEY: &str = "msgFormatDataMessageQualityKeyName";
pub const VALUE_KEY: &str = "msgFormatDataMessageValueKeyName";
pub const TIMESTAMP_KEY: &str = "msgFormatDataMessageTimestampKeyName";
pub const TIMESTAMP_FORMAT: &str = "msgFormatDataMessageTimestampFormat";
pub const ALIAS_DELIMITER: &str = "msgFormatDataAliasDelimiter";

/// Format used when a record does not carry its own.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

const REQUIRED: [&str; 7] = [
    attr::ID,
    MESSAGES_KEY,
    ALIAS_KEY,
    QUALITY_KEY,
    VALUE_KEY,
    TIMESTAMP_KEY,
    ALIAS_DELIMITER,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFormat {
    pub id: String,
    pub messages_key: String,
    pub alias_key: String,
    pub quality_key: String,
    pub value_key: String,
    pub timestamp_key: String,
    /// chrono strftime syntax.
    pub timestamp_format: String,
    pub alias_delimiter: String,
}

impl RecordConfig for MessageFormat {
    fn from_record(record: &Record) -> Result<Self, ConfigError> {
        validate_required_properties(record, &REQUIRED)?;

        let timestamp_format = extract_attr::<Option<String>>(record, TIMESTAMP_FORMAT, None)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string());

        let format = Self {
            id: extract_text(record, attr::ID),
            messages_key: extract_text(record, MESSAGES_KEY),
            alias_key: extract_text(record, ALIAS_KEY),
            quality_key: extract_text(record, QUALITY_KEY),
            value_key: extract_text(record, VALUE_KEY),
            timestamp_key: extract_text(record, TIMESTAMP_KEY),
            timestamp_format,
            alias_delimiter: extract_text(record, ALIAS_DELIMITER),
        };

        format.validate()?;
        Ok(format)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            (MESSAGES_KEY, &self.messages_key),
            (ALIAS_KEY, &self.alias_key),
            (QUALITY_KEY, &self.quality_key),
            (VALUE_KEY, &self.value_key),
            (TIMESTAMP_KEY, &self.timestamp_key),
            (ALIAS_DELIMITER, &self.alias_delimiter),
        ];

        for (property, value) in fields {
            if value.is_empty() {
                return Err(ConfigError::MissingProperty(property.to_string()));
            }
        }

        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidProperty {
                property: TIMESTAMP_FORMAT.to_string(),
                reason: format!("'{}' is not a valid timestamp format", self.timestamp_format),
            });
        }

        Ok(())
    }
}

impl MessageFormat {
    /// Parses a timestamp strictly against this format, returning unix seconds.
    pub fn parse_timestamp(&self, value: &str) -> Option<i64> {
        parse_unix_seconds(value, &self.timestamp_format)
    }

    /// Like [`parse_timestamp`](Self::parse_timestamp), keeping sub-second precision.
    pub fn parse_datetime(&self, value: &str) -> Option<DateTime<Utc>> {
        parse_utc(value, &self.timestamp_format)
    }

    /// Splits an alias into `(machine_id, attribute_name)`. The last segment is
    /// the attribute; the rest, rejoined, is the machine id. Aliases with fewer
    /// than two segments yield `None`.
    pub fn split_alias(&self, alias: &str) -> Option<(String, String)> {
        let mut segments: Vec<&str> = alias.split(self.alias_delimiter.as_str()).collect();
        if segments.len() < 2 {
            return None;
        }

        let attribute = segments.pop()?.to_string();
        Some((segments.join(&self.alias_delimiter), attribute))
    }
}

/// Parses the whole of `value` against `format`. Formats carrying an offset
/// resolve to that instant; formats without one are read as UTC.
pub fn parse_utc(value: &str, format: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_str(value, format) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) if e.kind() == ParseErrorKind::NotEnough => NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc()),
        Err(_) => None,
    }
}

pub fn parse_unix_seconds(value: &str, format: &str) -> Option<i64> {
    parse_utc(value, format).map(|dt| dt.timestamp())
}
