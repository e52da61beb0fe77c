//! Machine Data Parser
//!
//! Holds the catalog of message formats and machine classification rules,
//! and turns raw base64-encoded batches into typed observations.
//!
//! The parser is a pure function of its catalog and the payload. It never
//! creates rules for unseen machines; that is left to the caller.

pub mod classifier;
pub mod resolver;

pub use classifier::classify;
pub use resolver::resolve;

use crate::config::RecordConfig;
use crate::error::{ClassificationError, ConfigError};
use crate::model::{MachineConfig, MessageFormat, Observation, Record, RecordType};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MachineDataParser {
    formats: Vec<MessageFormat>,
    machines: HashMap<String, MachineConfig>,
}

impl MachineDataParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one configuration record. Invalid records are logged and
    /// dropped; already-registered configuration is left untouched.
    ///
    /// Returns whether the record was registered.
    pub fn add_config(&mut self, record: &Record) -> bool {
        match self.try_add_config(record) {
            Ok(()) => true,
            Err(e) => {
                let id = record.get("id").map(crate::util::stringify_value);
                tracing::warn!("Skipping configuration record {:?}: {}", id, e);
                false
            }
        }
    }

    fn try_add_config(&mut self, record: &Record) -> Result<(), ConfigError> {
        match RecordType::of(record) {
            Some(RecordType::MessageFormat) => {
                let format = MessageFormat::from_record(record)?;
                tracing::debug!("Registered message format '{}'", format.id);

                // Re-registering an id replaces it in place, keeping catalog order.
                match self.formats.iter_mut().find(|f| f.id == format.id) {
                    Some(existing) => *existing = format,
                    None => self.formats.push(format),
                }
            }
            Some(RecordType::MachineConfig) => {
                let config = MachineConfig::from_record(record)?;
                tracing::debug!("Registered machine config '{}'", config.machine_id);
                self.machines.insert(config.machine_id.clone(), config);
            }
            Some(other) => return Err(ConfigError::UnsupportedType(other.to_string())),
            None => return Err(ConfigError::MissingProperty("type".to_string())),
        }

        Ok(())
    }

    pub fn formats(&self) -> &[MessageFormat] {
        &self.formats
    }

    pub fn format_count(&self) -> usize {
        self.formats.len()
    }

    pub fn machine_config_count(&self) -> usize {
        self.machines.len()
    }

    pub fn machine_config(&self, machine_id: &str) -> Option<&MachineConfig> {
        self.machines.get(machine_id)
    }

    /// Decodes a base64 JSON batch and extracts one observation per sub-message.
    /// The whole batch fails if it cannot be decoded or no format matches it.
    pub fn parse_data(&self, encoded: &str) -> Result<Vec<Observation>, ClassificationError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let payload: Value = serde_json::from_slice(&bytes)?;

        self.parse_payload(&payload).map(|(_, observations)| observations)
    }

    /// Like [`parse_data`](Self::parse_data) for an already-decoded payload,
    /// also returning the format that matched.
    pub fn parse_payload(
        &self,
        payload: &Value,
    ) -> Result<(&MessageFormat, Vec<Observation>), ClassificationError> {
        let format = resolve(&self.formats, payload).ok_or(ClassificationError::NoMatchingFormat)?;

        let messages = payload
            .get(&format.messages_key)
            .and_then(Value::as_array)
            .ok_or(ClassificationError::NoMatchingFormat)?;

        let observations = messages
            .iter()
            .enumerate()
            .map(|(index, message)| self.observe(format, index, message))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Parsed {} observations with message format '{}'",
            observations.len(),
            format.id
        );

        Ok((format, observations))
    }

    fn observe(
        &self,
        format: &MessageFormat,
        index: usize,
        message: &Value,
    ) -> Result<Observation, ClassificationError> {
        let malformed = |reason: &str| ClassificationError::MalformedMessage {
            index,
            reason: reason.to_string(),
        };

        let alias = message
            .get(&format.alias_key)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("alias is not a string"))?;
        let (machine_id, attribute_name) = format
            .split_alias(alias)
            .ok_or_else(|| malformed("alias has fewer than two segments"))?;
        let timestamp = message
            .get(&format.timestamp_key)
            .and_then(Value::as_str)
            .and_then(|ts| format.parse_timestamp(ts))
            .ok_or_else(|| malformed("timestamp does not match the format"))?;

        let value = message.get(&format.value_key).cloned().unwrap_or(Value::Null);
        let quality = message.get(&format.quality_key).cloned().unwrap_or(Value::Null);

        let mut observation = Observation {
            machine_id,
            attribute_name,
            timestamp,
            value,
            quality,
            is_status: false,
            is_production_count: false,
            status: None,
        };

        if let Some(rule) = self.machine_config(&observation.machine_id) {
            observation.is_status = rule.is_status_tag(&observation.attribute_name);
            observation.is_production_count = rule.is_production_count_tag(&observation.attribute_name);

            if observation.is_status {
                observation.status = classify(&observation.value, rule);
            }
        }

        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MachineStatus;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn format_record(id: &str) -> Record {
        record(json!({
            "id": id,
            "type": "MESSAGE_FORMAT",
            "msgFormatDataMessagesKeyName": "mkn",
            "msgFormatDataMessageAliasKeyName": "akn",
            "msgFormatDataMessageQualityKeyName": "qkn",
            "msgFormatDataMessageValueKeyName": "vkn",
            "msgFormatDataMessageTimestampKeyName": "tkn",
            "msgFormatDataAliasDelimiter": "/"
        }))
    }

    fn machine_record() -> Record {
        record(json!({
            "id": "site/area/proc/machine",
            "type": "MACHINE_CONFIG",
            "machineStatusTagName": "status",
            "machineStatusUpValue": "u",
            "machineStatusDownValue": "d",
            "machineStatusIdleValue": "",
            "machineProductionCountTagName": "count"
        }))
    }

    fn encode(payload: &Value) -> String {
        BASE64.encode(payload.to_string())
    }

    fn parser() -> MachineDataParser {
        let mut parser = MachineDataParser::new();
        assert!(parser.add_config(&format_record("DEFAULT")));
        assert!(parser.add_config(&machine_record()));
        parser
    }

    #[test]
    fn test_parses_status_message() {
        let payload = json!({"mkn": [{
            "akn": "site/area/proc/machine/status",
            "qkn": "GOOD",
            "tkn": "2021-03-05 18:16:10.517000+00:00",
            "vkn": "u"
        }]});

        let observations = parser().parse_data(&encode(&payload)).unwrap();
        assert_eq!(observations.len(), 1);

        let obs = &observations[0];
        assert_eq!(obs.machine_id, "site/area/proc/machine");
        assert_eq!(obs.attribute_name, "status");
        assert_eq!(obs.timestamp, 1614968170);
        assert!(obs.is_status);
        assert!(!obs.is_production_count);
        assert_eq!(obs.status, Some(MachineStatus::Up));
    }

    #[test]
    fn test_extracts_one_observation_per_message() {
        let payload = json!({"mkn": [
            {"akn": "site/area/proc/machine/status", "qkn": "GOOD", "tkn": "2021-03-05 18:16:10+00:00", "vkn": "d"},
            {"akn": "site/area/proc/machine/count", "qkn": "GOOD", "tkn": "2021-03-05 18:16:11+00:00", "vkn": 42},
            {"akn": "site/area/proc/machine/temperature", "qkn": "GOOD", "tkn": "2021-03-05 18:16:12+00:00", "vkn": 71.5}
        ]});

        let observations = parser().parse_data(&encode(&payload)).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].status, Some(MachineStatus::Down));
        assert!(observations[1].is_production_count);
        assert_eq!(observations[1].value_text(), "42");
        assert!(!observations[2].is_status && !observations[2].is_production_count);
    }

    #[test]
    fn test_unknown_machine_is_emitted_unclassified() {
        let payload = json!({"mkn": [{
            "akn": "other/machine/status", "qkn": "GOOD", "tkn": "2021-03-05 18:16:10+00:00", "vkn": "u"
        }]});

        let observations = parser().parse_data(&encode(&payload)).unwrap();
        assert_eq!(observations[0].machine_id, "other/machine");
        assert!(!observations[0].is_status);
        assert_eq!(observations[0].status, None);
    }

    #[test]
    fn test_batch_errors() {
        let parser = parser();
        assert!(matches!(parser.parse_data("not base64!"), Err(ClassificationError::Base64(_))));
        assert!(matches!(
            parser.parse_data(&BASE64.encode("{not json")),
            Err(ClassificationError::Json(_))
        ));
        assert!(matches!(
            parser.parse_data(&encode(&json!({"messages": []}))),
            Err(ClassificationError::NoMatchingFormat)
        ));
    }

    #[test]
    fn test_invalid_config_is_dropped_without_affecting_catalog() {
        let mut parser = parser();
        let mut broken = format_record("BROKEN");
        broken.remove("msgFormatDataAliasDelimiter");

        assert!(!parser.add_config(&broken));
        assert!(!parser.add_config(&record(json!({"id": "x", "type": "MACHINE"}))));
        assert!(!parser.add_config(&record(json!({"id": "x"}))));
        assert_eq!(parser.format_count(), 1);
        assert_eq!(parser.machine_config_count(), 1);
    }

    #[test]
    fn test_reregistering_format_replaces_in_place() {
        let mut parser = parser();
        parser.add_config(&format_record("SECOND"));

        let mut updated = format_record("DEFAULT");
        updated.insert("msgFormatDataAliasDelimiter".into(), json!("."));
        parser.add_config(&updated);

        let ids: Vec<_> = parser.formats().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["DEFAULT", "SECOND"]);
        assert_eq!(parser.formats()[0].alias_delimiter, ".");
    }
}
