//! Analytics Exports
//!
//! Flat views over the reference and configuration tables for BI tooling,
//! and a normalized form of raw messages. CSV values are wrapped in single
//! quotes, the text qualifier the consumers expect.

use crate::config::{extract_text, RecordConfig, TableConfig};
use crate::error::ClassificationError;
use crate::model::format::ALIAS_DELIMITER;
use crate::model::machine::{STATUS_DOWN_VALUE, STATUS_TAG};
use crate::model::{attr, text_attr, MessageFormat, Record, RecordType, DEFAULT_ID};
use crate::source::RawRecord;
use crate::store::{scan_with_handler, ItemKey, KeyValueStore};
use crate::util::stringify_value;

use anyhow::{anyhow, Context};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;
use serde_json::Value;

pub const MACHINE_INFORMATION_HEADER: &str = "id,machine_name,location,line";
pub const MACHINE_CONFIG_HEADER: &str = "id,status_tag,down_value";

/// Timestamp layout of normalized messages.
pub const NORMALIZED_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

fn quoted(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Alias segment positions from a `/`-separated list such as `0/1`.
pub fn parse_positions(keys: &str) -> Vec<usize> {
    keys.split('/')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter_map(|k| match k.parse() {
            Ok(position) => Some(position),
            Err(_) => {
                tracing::warn!("Ignoring invalid alias segment position '{}'", k);
                None
            }
        })
        .collect()
}

/// Picks the segments at `positions`, skipping positions past the end, and
/// joins them with `delimiter`.
pub fn build_location_line(segments: &[&str], positions: &[usize], delimiter: &str) -> String {
    positions
        .iter()
        .filter_map(|p| segments.get(*p).copied())
        .collect::<Vec<_>>()
        .join(delimiter)
}

async fn default_format_record<S>(store: &S, tables: &TableConfig) -> anyhow::Result<Record>
where
    S: KeyValueStore + ?Sized,
{
    let key = ItemKey::typed(DEFAULT_ID, RecordType::MessageFormat.as_str());
    store
        .get(&tables.config, &key)
        .await?
        .ok_or_else(|| anyhow!("Default message format does not exist in '{}'", tables.config))
}

/// `id,machine_name,location,line`, one row per machine reference record.
pub async fn machine_information_csv<S>(store: &S, tables: &TableConfig) -> anyhow::Result<String>
where
    S: KeyValueStore + ?Sized,
{
    let format = default_format_record(store, tables).await?;
    let delimiter = extract_text(&format, ALIAS_DELIMITER);
    if delimiter.is_empty() {
        return Err(anyhow!("Default message format has no alias delimiter"));
    }

    let mapping_key = ItemKey::typed(DEFAULT_ID, RecordType::UiReferenceMapping.as_str());
    let (location_positions, line_positions) = match store.get(&tables.ui_reference, &mapping_key).await? {
        Some(mapping) => (
            parse_positions(&extract_text(&mapping, attr::UI_LOCATION_KEYS)),
            parse_positions(&extract_text(&mapping, attr::UI_LINE_KEYS)),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let mut rows = vec![MACHINE_INFORMATION_HEADER.to_string()];
    scan_with_handler(store, &tables.ui_reference, Some(RecordType::Machine.as_str()), |record| {
        let Some(id) = text_attr(&record, attr::ID) else {
            return;
        };
        let name = text_attr(&record, attr::NAME).unwrap_or(id);

        let segments: Vec<&str> = id.split(delimiter.as_str()).collect();
        let location = build_location_line(&segments, &location_positions, &delimiter);
        let line = build_location_line(&segments, &line_positions, &delimiter);

        rows.push(quoted(&[id, name, location.as_str(), line.as_str()]));
    })
    .await?;

    tracing::info!("Machine information export has {} rows", rows.len() - 1);
    Ok(rows.join("\n"))
}

/// `id,status_tag,down_value`, one row per DOWN value of each machine rule.
pub async fn machine_config_csv<S>(store: &S, tables: &TableConfig) -> anyhow::Result<String>
where
    S: KeyValueStore + ?Sized,
{
    let mut rows = vec![MACHINE_CONFIG_HEADER.to_string()];

    scan_with_handler(store, &tables.config, Some(RecordType::MachineConfig.as_str()), |record| {
        let id = extract_text(&record, attr::ID);
        let status_tag = extract_text(&record, STATUS_TAG);
        let down_values = extract_text(&record, STATUS_DOWN_VALUE);

        for value in down_values.split(',') {
            rows.push(quoted(&[id.as_str(), status_tag.as_str(), value.trim()]));
        }
    })
    .await?;

    tracing::info!("Machine config export has {} rows", rows.len() - 1);
    Ok(rows.join("\n"))
}

/// One sub-message in a flat, query-friendly shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub id: String,
    pub tag: String,
    pub timestamp: String,
    pub quality: String,
    pub value: String,
}

/// Flattens a decoded payload using `format`. Any sub-message that does not
/// fit the format fails the payload.
pub fn normalize_payload(format: &MessageFormat, payload: &Value) -> Result<Vec<NormalizedMessage>, ClassificationError> {
    let messages = payload
        .get(&format.messages_key)
        .and_then(Value::as_array)
        .ok_or(ClassificationError::NoMatchingFormat)?;

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let malformed = |reason: &str| ClassificationError::MalformedMessage {
                index,
                reason: reason.to_string(),
            };

            let (id, tag) = message
                .get(&format.alias_key)
                .and_then(Value::as_str)
                .and_then(|alias| format.split_alias(alias))
                .ok_or_else(|| malformed("alias is missing or has fewer than two segments"))?;
            let timestamp = message
                .get(&format.timestamp_key)
                .and_then(Value::as_str)
                .and_then(|ts| format.parse_datetime(ts))
                .ok_or_else(|| malformed("timestamp does not match the format"))?;

            let text = |key: &str| message.get(key).map(stringify_value).unwrap_or_default();

            Ok(NormalizedMessage {
                id,
                tag,
                timestamp: timestamp.format(NORMALIZED_TIMESTAMP_FORMAT).to_string(),
                quality: text(&format.quality_key),
                value: text(&format.value_key),
            })
        })
        .collect()
}

/// Normalizes raw records with the default message format. Records that
/// cannot be decoded or normalized are logged and skipped.
pub async fn normalize_records<S>(
    store: &S,
    tables: &TableConfig,
    records: &[RawRecord],
) -> anyhow::Result<Vec<NormalizedMessage>>
where
    S: KeyValueStore + ?Sized,
{
    let format = MessageFormat::from_record(&default_format_record(store, tables).await?)
        .context("Default message format is invalid")?;

    let mut normalized = Vec::new();
    for (index, raw) in records.iter().enumerate() {
        let decoded = BASE64
            .decode(raw.data.trim())
            .map_err(ClassificationError::from)
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(ClassificationError::from))
            .and_then(|payload| normalize_payload(&format, &payload));

        match decoded {
            Ok(messages) => normalized.extend(messages),
            Err(e) => tracing::warn!("Skipping record {} in normalization: {}", index, e),
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::TableSchema, MemoryStore};
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn format_record() -> Record {
        record(json!({
            "id": "DEFAULT",
            "type": "MESSAGE_FORMAT",
            "msgFormatDataMessagesKeyName": "mkn",
            "msgFormatDataMessageAliasKeyName": "akn",
            "msgFormatDataMessageQualityKeyName": "qkn",
            "msgFormatDataMessageValueKeyName": "vkn",
            "msgFormatDataMessageTimestampKeyName": "tkn",
            "msgFormatDataAliasDelimiter": "/"
        }))
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new(vec![TableSchema::typed("config"), TableSchema::typed("ui_reference")], 1);
        store.put("config", format_record()).await.unwrap();
        store
            .put("config", record(json!({
                "id": "site/area/line1/press", "type": "MACHINE_CONFIG",
                "machineStatusTagName": "status", "machineStatusDownValue": "0, stop"
            })))
            .await
            .unwrap();
        store
            .put("ui_reference", record(json!({
                "id": "DEFAULT", "type": "UI_REFERENCE_MAPPING",
                "uiReferenceMappingLocationKeys": "0/1", "uiReferenceMappingLineKeys": "2/7"
            })))
            .await
            .unwrap();
        store
            .put("ui_reference", record(json!({"id": "site/area/line1/press", "type": "MACHINE", "name": "Press"})))
            .await
            .unwrap();
        store
            .put("ui_reference", record(json!({"id": "site/area/line2/lathe", "type": "MACHINE"})))
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_build_location_line_skips_out_of_range() {
        let segments = ["site", "area", "line1", "press"];
        assert_eq!(build_location_line(&segments, &[0, 1], "/"), "site/area");
        assert_eq!(build_location_line(&segments, &[2, 9], "/"), "line1");
        assert_eq!(build_location_line(&segments, &[], "/"), "");
        assert_eq!(parse_positions("0/x/ 2 /"), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_machine_information_csv() {
        let store = store().await;
        let csv = machine_information_csv(&store, &TableConfig::default()).await.unwrap();

        assert_eq!(
            csv,
            "id,machine_name,location,line\n\
             'site/area/line1/press','Press','site/area','line1'\n\
             'site/area/line2/lathe','site/area/line2/lathe','site/area','line2'"
        );
    }

    #[tokio::test]
    async fn test_machine_information_requires_default_format() {
        let store = MemoryStore::new(vec![TableSchema::typed("config"), TableSchema::typed("ui_reference")], 10);
        assert!(machine_information_csv(&store, &TableConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_machine_config_csv_has_row_per_down_value() {
        let store = store().await;
        let csv = machine_config_csv(&store, &TableConfig::default()).await.unwrap();

        assert_eq!(
            csv,
            "id,status_tag,down_value\n\
             'site/area/line1/press','status','0'\n\
             'site/area/line1/press','status','stop'"
        );
    }

    #[tokio::test]
    async fn test_normalize_records() {
        let store = store().await;
        let payload = json!({"mkn": [
            {"akn": "site/area/line1/press/status", "qkn": "GOOD", "tkn": "2021-03-05 20:16:10.517+02:00", "vkn": 1}
        ]});
        let records = vec![
            RawRecord::new(BASE64.encode(payload.to_string())),
            RawRecord::new("not base64!"),
        ];

        let normalized = normalize_records(&store, &TableConfig::default(), &records).await.unwrap();
        assert_eq!(
            normalized,
            vec![NormalizedMessage {
                id: "site/area/line1/press".into(),
                tag: "status".into(),
                timestamp: "2021/03/05 18:16:10.517000".into(),
                quality: "GOOD".into(),
                value: "1".into(),
            }]
        );
    }
}
