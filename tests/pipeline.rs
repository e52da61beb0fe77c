use floorwatch::aggregate::{fetch_chunks, ChunkRequest};
use floorwatch::config::{RetentionPolicy, TableConfig};
use floorwatch::ingest::Ingestor;
use floorwatch::model::{attr, Record, StatusValue};
use floorwatch::reactor::{ConfigChangeEvent, ConfigChangeReactor};
use floorwatch::source::RawRecord;
use floorwatch::store::memory::TableSchema;
use floorwatch::store::{patch_record, ItemKey, KeyValueStore, MemoryStore};
use floorwatch::usage::{CollectingReporter, UsageSignal};

use serde_json::{json, Value};
use std::sync::Arc;

const MACHINE: &str = "site/area/proc/machine";
// 2021-03-05 18:16:00 UTC
const T: i64 = 1_614_968_160;

fn record(value: Value) -> Record {
    serde_json::from_value(value).unwrap()
}

fn message_format() -> Record {
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

fn machine_config(down: &str) -> Record {
    record(json!({
        "id": MACHINE,
        "type": "MACHINE_CONFIG",
        "machineStatusTagName": "status",
        "machineStatusUpValue": "u",
        "machineStatusDownValue": down,
        "machineStatusIdleValue": "i",
        "machineProductionCountTagName": "count"
    }))
}

fn batch(messages: &[(&str, &str, Value)]) -> RawRecord {
    let messages: Vec<Value> = messages
        .iter()
        .map(|(tag, ts, value)| {
            json!({"akn": format!("{MACHINE}/{tag}"), "qkn": "GOOD", "tkn": ts, "vkn": value})
        })
        .collect();
    RawRecord::encode(json!({ "mkn": messages }).to_string().as_bytes())
}

struct Harness {
    store: Arc<MemoryStore>,
    usage: Arc<CollectingReporter>,
    ingestor: Ingestor,
    reactor: ConfigChangeReactor,
}

async fn harness() -> Harness {
    let tables = TableConfig::default();
    let store = Arc::new(MemoryStore::new(TableSchema::for_tables(&tables), 4));
    let usage = Arc::new(CollectingReporter::new());

    let ingestor = Ingestor::new(
        store.clone(),
        tables.clone(),
        RetentionPolicy::new(48).unwrap(),
        usage.clone(),
    );
    let reactor = ConfigChangeReactor::new(store.clone(), &tables.config, usage.clone());

    Harness {
        store,
        usage,
        ingestor,
        reactor,
    }
}

/// Patches a configuration record and feeds the change to the reactor.
async fn configure(h: &Harness, record: Record) -> Option<u64> {
    let key = ItemKey::typed(record[attr::ID].as_str().unwrap(), record[attr::TYPE].as_str().unwrap());
    let (old, new) = patch_record(h.store.as_ref(), "config", &key, &record).await.unwrap();
    let outcome = h
        .reactor
        .handle(&[ConfigChangeEvent::new(old, Some(new))])
        .await
        .unwrap();
    outcome.generation
}

#[tokio::test]
async fn ingest_then_query_chunks() {
    let mut h = harness().await;
    assert_eq!(configure(&h, message_format()).await, Some(1));
    assert_eq!(configure(&h, machine_config("d")).await, None);

    let records = vec![
        batch(&[
            ("status", "2021-03-05 18:16:10.517000+00:00", json!("u")),
            ("status", "2021-03-05 18:16:20+00:00", json!("i")),
            ("status", "2021-03-05 18:16:30+00:00", json!("d")),
            ("status", "2021-03-05 18:16:40+00:00", json!("u")),
            ("count", "2021-03-05 18:16:50+00:00", json!(10)),
        ]),
        RawRecord::new("garbage"),
        batch(&[
            ("count", "2021-03-05 18:17:30+00:00", json!(12)),
            ("status", "2021-03-05 18:17:31+00:00", json!("u")),
            ("count", "2021-03-05 18:18:30+00:00", json!(1)),
            ("count", "2021-03-05 18:19:30+00:00", json!(5)),
            ("temperature", "2021-03-05 18:19:31+00:00", json!(71.2)),
        ]),
    ];

    let summary = h.ingestor.process_batch(&records).await.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.rejected_records, 1);
    assert_eq!(summary.observations, 10);
    assert_eq!(summary.persisted_items, 9);

    let request = ChunkRequest {
        id: MACHINE.to_string(),
        start_timestamp: T,
        end_timestamp: T + 3600,
        incremental_refresh: false,
    };
    let response = fetch_chunks(h.store.as_ref(), "data", &request).await.unwrap();

    assert_eq!(response.chunks.len(), 60);
    assert_eq!(response.chunks[0].data_as_of, T + 60);
    assert_eq!(response.chunks[0].status_value, StatusValue::Down);
    assert_eq!(response.chunks[0].production_count_value, Some(10.0));
    assert_eq!(response.chunks[1].status_value, StatusValue::Up);
    assert_eq!(response.chunks[1].production_count_value, Some(12.0));
    assert_eq!(response.chunks[3].production_count_value, Some(5.0));
    assert_eq!(response.total_production_count, 17.0);

    let incremental = fetch_chunks(
        h.store.as_ref(),
        "data",
        &ChunkRequest {
            incremental_refresh: true,
            ..request
        },
    )
    .await
    .unwrap();
    assert_eq!(incremental.chunks.len(), 4);

    assert!(h.usage.signals().contains(&UsageSignal::BatchProcessed {
        records: 3,
        observations: 10,
        formats: 1,
        machine_configs: 1,
    }));
}

#[tokio::test]
async fn rule_change_reaches_ingestor_through_generation() {
    let mut h = harness().await;
    configure(&h, message_format()).await;
    configure(&h, machine_config("d")).await;

    let records = vec![batch(&[("status", "2021-03-05 18:16:10+00:00", json!("halt"))])];

    h.ingestor.process_batch(&records).await.unwrap();
    let first = h.ingestor.loaded_generation();

    // A partial record only touches the attributes it carries, and modifying
    // an existing rule dirties the cache and bumps the generation.
    let partial = record(json!({
        "id": MACHINE,
        "type": "MACHINE_CONFIG",
        "machineStatusDownValue": "d,halt"
    }));
    let generation = configure(&h, partial).await;
    assert_eq!(generation, Some(first.unwrap() + 1));

    let rule = h
        .store
        .get("config", &ItemKey::typed(MACHINE, "MACHINE_CONFIG"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rule["machineStatusTagName"], json!("status"));
    assert_eq!(rule["machineProductionCountTagName"], json!("count"));

    let summary = h.ingestor.process_batch(&records).await.unwrap();
    assert!(summary.catalog_reloaded);

    let response = fetch_chunks(
        h.store.as_ref(),
        "data",
        &ChunkRequest {
            id: MACHINE.to_string(),
            start_timestamp: T,
            end_timestamp: T + 60,
            incremental_refresh: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(response.chunks[0].status_value, StatusValue::Down);
}
