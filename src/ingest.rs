//! Ingestion Orchestrator
//!
//! Runs one batch of raw records through the parser and persists the
//! resulting observations:
//!
//! 1. compare the stored cache generation with the one the catalog was
//!    loaded at, and reload the catalog and known machines on mismatch;
//! 2. parse each record, logging and skipping records that fail;
//! 3. give machines seen for the first time a default rule and reference
//!    record (upsert-if-absent);
//! 4. write status and production-count items with a TTL, 25 per request;
//! 5. report a usage signal for the batch.

use crate::config::{RetentionPolicy, TableConfig};
use crate::error::StoreError;
use crate::model::{attr, MachineConfig, Observation, ObservationKind, Record, RecordType};
use crate::parser::MachineDataParser;
use crate::reactor::read_generation;
use crate::source::RawRecord;
use crate::store::{batch_write_chunked, scan_with_handler, AttributePatch, ItemKey, KeyValueStore};
use crate::usage::{UsageReporter, UsageSignal};

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// The parser and known machines as of one cache generation.
#[derive(Default)]
struct Catalog {
    generation: Option<u64>,
    parser: MachineDataParser,
    known_machines: HashSet<String>,
}

impl Catalog {
    async fn load(store: &dyn KeyValueStore, tables: &TableConfig, generation: u64) -> Result<Self, StoreError> {
        let mut parser = MachineDataParser::new();
        let mut known_machines = HashSet::new();

        for record_type in [RecordType::MessageFormat, RecordType::MachineConfig] {
            scan_with_handler(store, &tables.config, Some(record_type.as_str()), |record| {
                parser.add_config(&record);
            })
            .await?;
        }

        scan_with_handler(store, &tables.ui_reference, Some(RecordType::Machine.as_str()), |record| {
            if let Some(id) = record.get(attr::ID).and_then(Value::as_str) {
                known_machines.insert(id.to_string());
            }
        })
        .await?;

        tracing::info!(
            "Loaded configuration generation {}: {} message formats, {} machine configs, {} known machines",
            generation,
            parser.format_count(),
            parser.machine_config_count(),
            known_machines.len()
        );

        Ok(Self {
            generation: Some(generation),
            parser,
            known_machines,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub records: usize,
    pub rejected_records: usize,
    pub observations: usize,
    pub persisted_items: usize,
    pub new_machines: usize,
    pub catalog_reloaded: bool,
}

pub struct Ingestor {
    store: Arc<dyn KeyValueStore>,
    tables: TableConfig,
    retention: RetentionPolicy,
    usage: Arc<dyn UsageReporter>,
    catalog: Catalog,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        tables: TableConfig,
        retention: RetentionPolicy,
        usage: Arc<dyn UsageReporter>,
    ) -> Self {
        Self {
            store,
            tables,
            retention,
            usage,
            catalog: Catalog::default(),
        }
    }

    /// Generation of the currently loaded catalog, if one has been loaded.
    pub fn loaded_generation(&self) -> Option<u64> {
        self.catalog.generation
    }

    /// Reloads the catalog when the stored generation has moved on.
    /// Returns whether a reload happened.
    pub async fn refresh_catalog(&mut self) -> Result<bool, StoreError> {
        let generation = read_generation(self.store.as_ref(), &self.tables.config).await?;
        if self.catalog.generation == Some(generation) {
            return Ok(false);
        }

        self.catalog = Catalog::load(self.store.as_ref(), &self.tables, generation).await?;
        Ok(true)
    }

    pub async fn process_batch(&mut self, records: &[RawRecord]) -> anyhow::Result<BatchSummary> {
        let mut summary = BatchSummary {
            records: records.len(),
            catalog_reloaded: self.refresh_catalog().await?,
            ..BatchSummary::default()
        };

        let mut items = Vec::new();

        for (index, raw) in records.iter().enumerate() {
            let observations = match self.catalog.parser.parse_data(&raw.data) {
                Ok(observations) => observations,
                Err(e) => {
                    tracing::warn!("Dropping record {} of batch: {}", index, e);
                    summary.rejected_records += 1;
                    continue;
                }
            };

            summary.observations += observations.len();

            for observation in observations {
                if !self.catalog.known_machines.contains(&observation.machine_id) {
                    match self.register_machine(&observation.machine_id).await {
                        Ok(()) => {
                            self.catalog.known_machines.insert(observation.machine_id.clone());
                            summary.new_machines += 1;
                        }
                        Err(e) => tracing::error!(
                            "Failed to register machine '{}': {}",
                            observation.machine_id,
                            e
                        ),
                    }
                }

                items.extend(self.data_items(&observation));
            }
        }

        summary.persisted_items = batch_write_chunked(self.store.as_ref(), &self.tables.data, items).await?;

        tracing::info!(
            "Processed {} records: {} rejected, {} observations, {} items persisted",
            summary.records,
            summary.rejected_records,
            summary.observations,
            summary.persisted_items
        );

        self.usage
            .report(UsageSignal::BatchProcessed {
                records: summary.records,
                observations: summary.observations,
                formats: self.catalog.parser.format_count(),
                machine_configs: self.catalog.parser.machine_config_count(),
            })
            .await;

        Ok(summary)
    }

    /// Writes a default rule and reference record for a machine unless they
    /// already exist.
    async fn register_machine(&self, machine_id: &str) -> Result<(), StoreError> {
        let config_key = ItemKey::typed(machine_id, RecordType::MachineConfig.as_str());
        if self.store.get(&self.tables.config, &config_key).await?.is_none() {
            let defaults: AttributePatch = MachineConfig::default_attributes().into_iter().collect();
            self.store.update(&self.tables.config, &config_key, &defaults).await?;
            tracing::info!("Created default machine config for '{}'", machine_id);
        }

        let machine_key = ItemKey::typed(machine_id, RecordType::Machine.as_str());
        if self.store.get(&self.tables.ui_reference, &machine_key).await?.is_none() {
            let patch = AttributePatch::new().set(attr::NAME, machine_id);
            self.store.update(&self.tables.ui_reference, &machine_key, &patch).await?;
        }

        Ok(())
    }

    /// One data table item per persisted kind of the observation. Only the
    /// status item carries the classified `status`.
    fn data_items(&self, observation: &Observation) -> Vec<Record> {
        observation
            .kinds()
            .map(|kind| {
                let mut item = Record::new();
                item.insert(attr::ID.to_string(), Value::from(kind.partition_key(&observation.machine_id)));
                item.insert(attr::TIMESTAMP.to_string(), Value::from(observation.timestamp));
                item.insert(attr::VALUE.to_string(), Value::from(observation.value_text()));
                item.insert(attr::TTL.to_string(), Value::from(self.retention.ttl(observation.timestamp)));

                if let (ObservationKind::Status, Some(status)) = (kind, observation.status) {
                    item.insert(attr::STATUS.to_string(), Value::from(status.as_str()));
                }
                item
            })
            .collect()
    }
}
