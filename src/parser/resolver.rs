//! Message Format Resolution
//!
//! Picks the first catalog entry whose structural expectations every
//! sub-message of a payload satisfies. There is no ranking: when two formats
//! could both match, catalog order decides.

use crate::model::MessageFormat;
use crate::util::is_present;

use serde_json::Value;
use tracing::debug;

/// Returns the first format in `catalog` that `payload` fully conforms to.
pub fn resolve<'a>(catalog: &'a [MessageFormat], payload: &Value) -> Option<&'a MessageFormat> {
    catalog.iter().find(|format| match check_payload(format, payload) {
        Ok(()) => true,
        Err(reason) => {
            debug!("Message format '{}' rejected: {}", format.id, reason);
            false
        }
    })
}

/// Checks a whole payload against one format.
pub fn check_payload(format: &MessageFormat, payload: &Value) -> Result<(), String> {
    let messages = payload
        .get(&format.messages_key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("no '{}' array", format.messages_key))?;

    for (index, message) in messages.iter().enumerate() {
        check_message(format, message).map_err(|reason| format!("message {index}: {reason}"))?;
    }

    Ok(())
}

/// Checks one sub-message: required fields present, strict timestamp, and an
/// alias with at least two segments.
pub fn check_message(format: &MessageFormat, message: &Value) -> Result<(), String> {
    let required = [
        &format.alias_key,
        &format.quality_key,
        &format.value_key,
        &format.timestamp_key,
    ];

    for key in required {
        if !is_present(message.get(key.as_str())) {
            return Err(format!("'{key}' is missing or blank"));
        }
    }

    let timestamp = message
        .get(&format.timestamp_key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("'{}' is not a string", format.timestamp_key))?;

    if format.parse_timestamp(timestamp).is_none() {
        return Err(format!(
            "timestamp '{timestamp}' does not match '{}'",
            format.timestamp_format
        ));
    }

    let alias = message
        .get(&format.alias_key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("'{}' is not a string", format.alias_key))?;

    if format.split_alias(alias).is_none() {
        return Err(format!(
            "alias '{alias}' has fewer than two '{}'-separated segments",
            format.alias_delimiter
        ));
    }

    Ok(())
}
