use crate::error::{ConfigError, EnvError};
use crate::model::Record;

use serde_json::Value;

/// Checks that every property is present, non-null and, for strings, not blank.
pub fn validate_required_properties(record: &Record, properties: &[&str]) -> Result<(), ConfigError> {
    for property in properties {
        if !is_present(record.get(*property)) {
            return Err(ConfigError::MissingProperty(property.to_string()));
        }
    }

    Ok(())
}

/// True when a JSON value exists, is not null and is not a blank string.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Renders a JSON value as plain text: strings unquoted, everything else in
/// its JSON form.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a decimal integer, rejecting anything that does not round-trip
/// exactly (surrounding whitespace, leading zeros, signs) and values below
/// `minimum`.
pub fn string_to_int(value: &str, minimum: i64) -> Result<i64, EnvError> {
    let parsed: i64 = value.trim().parse().map_err(|_| EnvError::NotAnInteger {
        value: value.to_string(),
    })?;

    if parsed.to_string() != value {
        return Err(EnvError::NotAnInteger {
            value: value.to_string(),
        });
    }

    if parsed < minimum {
        return Err(EnvError::BelowMinimum {
            value: parsed,
            minimum,
        });
    }

    Ok(parsed)
}
