//! Configuration Change Reactor
//!
//! Inspects before/after snapshots of configuration records and decides
//! whether the parser's cached catalog must be reloaded. Invalidation is
//! expressed by bumping a generation marker in the config table; ingestors
//! compare it against the generation their catalog was loaded at.

use crate::config::extract_attr;
use crate::error::StoreError;
use crate::model::{attr, text_attr, Record, RecordType, DEFAULT_ID};
use crate::store::{ItemKey, KeyValueStore};
use crate::usage::{UsageReporter, UsageSignal};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A write to a configuration or reference record. `old` is absent on
/// creation, `new` on removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    #[serde(default)]
    pub old: Option<Record>,
    #[serde(default)]
    pub new: Option<Record>,
}

impl ConfigChangeEvent {
    pub fn new(old: Option<Record>, new: Option<Record>) -> Self {
        Self { old, new }
    }

    pub fn record_type(&self) -> Option<RecordType> {
        self.new
            .as_ref()
            .and_then(RecordType::of)
            .or_else(|| self.old.as_ref().and_then(RecordType::of))
    }

    pub fn is_creation(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    pub fn is_changed(&self) -> bool {
        self.old != self.new
    }
}

/// What a single change event calls for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub cache_dirty: bool,
    pub signals: Vec<UsageSignal>,
}

pub fn classify(event: &ConfigChangeEvent) -> Reaction {
    let mut reaction = Reaction::default();
    if !event.is_changed() {
        return reaction;
    }

    let Some(record_type) = event.record_type() else {
        return reaction;
    };

    match record_type {
        RecordType::MessageFormat => {
            reaction.cache_dirty = true;
            reaction.signals.push(UsageSignal::ConfigurationChanged {
                kind: record_type.to_string(),
            });
        }
        // A new machine has an empty rule, so nothing cached depends on it yet.
        RecordType::MachineConfig if event.is_creation() => {}
        RecordType::MachineConfig => {
            reaction.cache_dirty = true;
            reaction.signals.push(UsageSignal::ConfigurationChanged {
                kind: record_type.to_string(),
            });
        }
        RecordType::UiReferenceMapping => reaction.signals.push(UsageSignal::GroupingChanged),
        RecordType::Machine => {
            let old_name = event.old.as_ref().and_then(|r| text_attr(r, attr::NAME));
            let new_name = event.new.as_ref().and_then(|r| text_attr(r, attr::NAME));

            if let (Some(old_name), Some(new_name)) = (old_name, new_name) {
                if old_name != new_name {
                    reaction.signals.push(UsageSignal::MachineNameChanged);
                }
            }
        }
        RecordType::CacheGeneration | RecordType::Other(_) => {}
    }

    reaction
}

/// Outcome of handling a group of change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactorOutcome {
    pub events: usize,
    pub dirtying_events: usize,
    /// The new generation, when the cache was invalidated.
    pub generation: Option<u64>,
}

pub struct ConfigChangeReactor {
    store: Arc<dyn KeyValueStore>,
    config_table: String,
    usage: Arc<dyn UsageReporter>,
}

impl ConfigChangeReactor {
    pub fn new(store: Arc<dyn KeyValueStore>, config_table: &str, usage: Arc<dyn UsageReporter>) -> Self {
        Self {
            store,
            config_table: config_table.to_string(),
            usage,
        }
    }

    /// Classifies every event, emits its usage signals and bumps the cache
    /// generation once if any event dirtied the cache.
    pub async fn handle(&self, events: &[ConfigChangeEvent]) -> Result<ReactorOutcome, StoreError> {
        let mut dirtying_events = 0;

        for event in events {
            let reaction = classify(event);
            if reaction.cache_dirty {
                tracing::debug!("Change to {:?} invalidates the configuration cache", event.record_type());
                dirtying_events += 1;
            }
            for signal in reaction.signals {
                self.usage.report(signal).await;
            }
        }

        let generation = if dirtying_events > 0 {
            Some(bump_generation(self.store.as_ref(), &self.config_table).await?)
        } else {
            None
        };

        Ok(ReactorOutcome {
            events: events.len(),
            dirtying_events,
            generation,
        })
    }
}

fn generation_key() -> ItemKey {
    ItemKey::typed(DEFAULT_ID, RecordType::CacheGeneration.as_str())
}

/// Current cache generation. A missing marker reads as generation 0.
pub async fn read_generation<S>(store: &S, config_table: &str) -> Result<u64, StoreError>
where
    S: KeyValueStore + ?Sized,
{
    let marker = store.get(config_table, &generation_key()).await?;
    Ok(marker.map_or(0, |record| extract_attr(&record, attr::GENERATION, 0_u64)))
}

/// Advances the cache generation with a single store increment, so
/// concurrent reactors never merge two bumps into one.
pub async fn bump_generation<S>(store: &S, config_table: &str) -> Result<u64, StoreError>
where
    S: KeyValueStore + ?Sized,
{
    let next = store
        .increment(config_table, &generation_key(), attr::GENERATION, 1)
        .await?;

    tracing::info!("Configuration cache generation bumped to {}", next);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::TableSchema, MemoryStore};
    use crate::usage::CollectingReporter;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn machine_config(up: &str) -> Record {
        record(json!({"id": "m1", "type": "MACHINE_CONFIG", "machineStatusTagName": "status", "machineStatusUpValue": up}))
    }

    #[test]
    fn test_message_format_change_dirties_cache() {
        let old = record(json!({"id": "DEFAULT", "type": "MESSAGE_FORMAT", "msgFormatDataAliasDelimiter": "/"}));
        let new = record(json!({"id": "DEFAULT", "type": "MESSAGE_FORMAT", "msgFormatDataAliasDelimiter": "."}));

        let reaction = classify(&ConfigChangeEvent::new(Some(old.clone()), Some(new.clone())));
        assert!(reaction.cache_dirty);
        assert_eq!(
            reaction.signals,
            vec![UsageSignal::ConfigurationChanged { kind: "MESSAGE_FORMAT".into() }]
        );

        assert!(classify(&ConfigChangeEvent::new(None, Some(new))).cache_dirty);
        assert!(!classify(&ConfigChangeEvent::new(Some(old.clone()), Some(old))).cache_dirty);
    }

    #[test]
    fn test_machine_config_creation_is_clean_modification_dirty() {
        assert!(!classify(&ConfigChangeEvent::new(None, Some(machine_config("")))).cache_dirty);
        assert!(classify(&ConfigChangeEvent::new(Some(machine_config("")), Some(machine_config("u")))).cache_dirty);
        assert!(classify(&ConfigChangeEvent::new(Some(machine_config("u")), None)).cache_dirty);
    }

    #[test]
    fn test_reference_changes_only_signal() {
        let mapping = |keys: &str| record(json!({"id": "DEFAULT", "type": "UI_REFERENCE_MAPPING", "uiReferenceMappingLineKeys": keys}));
        let reaction = classify(&ConfigChangeEvent::new(Some(mapping("1")), Some(mapping("1/2"))));
        assert!(!reaction.cache_dirty);
        assert_eq!(reaction.signals, vec![UsageSignal::GroupingChanged]);

        let machine = |name: &str| record(json!({"id": "m1", "type": "MACHINE", "name": name}));
        let renamed = classify(&ConfigChangeEvent::new(Some(machine("m1")), Some(machine("Press 1"))));
        assert!(!renamed.cache_dirty);
        assert_eq!(renamed.signals, vec![UsageSignal::MachineNameChanged]);

        assert!(classify(&ConfigChangeEvent::new(None, Some(machine("m1")))).signals.is_empty());
    }

    #[tokio::test]
    async fn test_handle_bumps_generation_once_per_call() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new(vec![TableSchema::typed("config")], 10));
        let usage = Arc::new(CollectingReporter::new());
        let reactor = ConfigChangeReactor::new(store.clone(), "config", usage.clone());

        assert_eq!(read_generation(store.as_ref(), "config").await.unwrap(), 0);

        let events = vec![
            ConfigChangeEvent::new(Some(machine_config("")), Some(machine_config("u"))),
            ConfigChangeEvent::new(Some(machine_config("u")), Some(machine_config("u,run"))),
            ConfigChangeEvent::new(None, Some(record(json!({"id": "m2", "type": "MACHINE_CONFIG"})))),
        ];
        let outcome = reactor.handle(&events).await.unwrap();

        assert_eq!(outcome.events, 3);
        assert_eq!(outcome.dirtying_events, 2);
        assert_eq!(outcome.generation, Some(1));
        assert_eq!(read_generation(store.as_ref(), "config").await.unwrap(), 1);
        assert_eq!(usage.signals().len(), 2);

        let clean = vec![ConfigChangeEvent::new(None, Some(machine_config("")))];
        assert_eq!(reactor.handle(&clean).await.unwrap().generation, None);
        assert_eq!(read_generation(store.as_ref(), "config").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_bumps_are_not_merged() {
        let store = MemoryStore::new(vec![TableSchema::typed("config")], 10);

        let (a, b) = tokio::join!(bump_generation(&store, "config"), bump_generation(&store, "config"));
        let mut bumped = vec![a.unwrap(), b.unwrap()];
        bumped.sort();

        assert_eq!(bumped, vec![1, 2]);
        assert_eq!(read_generation(&store, "config").await.unwrap(), 2);
    }

    #[test]
    fn test_event_deserializes_with_missing_side() {
        let event: ConfigChangeEvent =
            serde_json::from_str(r#"{"new": {"id": "DEFAULT", "type": "MESSAGE_FORMAT"}}"#).unwrap();
        assert!(event.is_creation());
        assert_eq!(event.record_type(), Some(RecordType::MessageFormat));
    }
}
