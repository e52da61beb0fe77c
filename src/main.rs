use floorwatch::aggregate::{fetch_chunks, ChunkRequest};
use floorwatch::config::{self, Config, RetentionPolicy, RuntimeToggles};
use floorwatch::export;
use floorwatch::ingest::Ingestor;
use floorwatch::logging;
use floorwatch::model::{attr, text_attr, Record, RecordType};
use floorwatch::reactor::{ConfigChangeEvent, ConfigChangeReactor};
use floorwatch::source::{load_batch_file, MqttBatchSource};
use floorwatch::store::memory::TableSchema;
use floorwatch::store::{patch_record, ItemKey, KeyValueStore, MemoryStore};
use floorwatch::usage::{LogUsageReporter, UsageReporter};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Floorwatch - machine status and production count telemetry
#[derive(Parser)]
#[command(name = "floorwatch")]
#[command(version)]
#[command(about = "Classifies factory-floor telemetry and serves status/production chunks")]
struct Cli {
    /// Configuration file path. Built-in defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest raw record batch files
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ingest batches collected from the configured MQTT broker
    Serve,

    /// Write or delete configuration records and react to the changes
    Configure {
        /// JSON file holding one record or an array of records
        file: PathBuf,

        /// Delete the records' items instead of writing them
        #[arg(long)]
        delete: bool,
    },

    /// Replay a JSON-lines file of configuration change events
    React { file: PathBuf },

    /// Print display chunks for one machine as JSON
    Chunks {
        #[arg(long)]
        id: String,

        #[arg(long)]
        start: i64,

        #[arg(long)]
        end: i64,

        /// Only return chunks that carry data
        #[arg(long)]
        incremental: bool,
    },

    /// Write an analytics export
    Export {
        #[arg(value_enum)]
        kind: ExportKind,

        /// Raw record batch file, for the `messages` export
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output file. Standard output when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    MachineInformation,
    MachineConfig,
    Messages,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let toggles = RuntimeToggles::from_env();
    let verbose = toggles.as_ref().map(|t| t.verbose_logging).unwrap_or(false);
    logging::init_logging(&cli.log_level, verbose);

    let toggles = match toggles {
        Ok(toggles) => toggles,
        Err(e) => {
            tracing::error!("Environment error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("Failed to load config from '{}': {:#}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(e) = config::validate_config(&config) {
        tracing::error!("Configuration error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, config, toggles).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: Config, toggles: RuntimeToggles) -> anyhow::Result<()> {
    let store = Arc::new(
        MemoryStore::open(
            &config.store.path,
            TableSchema::for_tables(&config.tables),
            config.store.page_size,
        )
        .await
        .context("Failed to open store")?,
    );
    let usage: Arc<dyn UsageReporter> = Arc::new(LogUsageReporter::new(toggles.send_usage_data));

    match command {
        Command::Ingest { files } => {
            let retention = RetentionPolicy::from_env()?;
            tracing::info!("Retaining observations for {} hours", retention.hours());
            let mut ingestor = Ingestor::new(store.clone(), config.tables.clone(), retention, usage);

            for file in files {
                let records = load_batch_file(&file).await?;
                let summary = ingestor.process_batch(&records).await?;
                println!("{}", serde_json::to_string(&summary)?);
            }
            store.save().await?;
        }

        Command::Serve => {
            let mqtt = config
                .mqtt
                .as_ref()
                .ok_or_else(|| anyhow!("The [mqtt] section is required for serve"))?;
            let retention = RetentionPolicy::from_env()?;
            tracing::info!("Retaining observations for {} hours", retention.hours());
            let mut ingestor = Ingestor::new(store.clone(), config.tables.clone(), retention, usage);
            let mut source = MqttBatchSource::connect(mqtt).await?;

            loop {
                let records = source.next_batch().await;
                if !records.is_empty() {
                    match ingestor.process_batch(&records).await {
                        Ok(_) => store.save().await?,
                        Err(e) => tracing::error!("Batch failed: {:#}", e),
                    }
                }
                if source.is_stopped() {
                    break;
                }
            }
            store.save().await?;
        }

        Command::Configure { file, delete } => {
            let records = read_records(&file).await?;
            let mut events = Vec::with_capacity(records.len());

            for record in records {
                let table = table_for(&config, &record)?;
                let key = record_key(&record)?;
                let event = if delete {
                    ConfigChangeEvent::new(store.delete(table, &key).await?, None)
                } else {
                    let (old, new) = patch_record(store.as_ref(), table, &key, &record).await?;
                    ConfigChangeEvent::new(old, Some(new))
                };
                events.push(event);
            }

            let reactor = ConfigChangeReactor::new(store.clone(), &config.tables.config, usage);
            let outcome = reactor.handle(&events).await?;
            tracing::info!(
                "Applied {} configuration changes, {} invalidating the cache",
                outcome.events,
                outcome.dirtying_events
            );
            store.save().await?;
        }

        Command::React { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read events file '{}'", file.display()))?;
            let events = content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str::<ConfigChangeEvent>(line))
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid change event")?;

            let reactor = ConfigChangeReactor::new(store.clone(), &config.tables.config, usage);
            let outcome = reactor.handle(&events).await?;
            if let Some(generation) = outcome.generation {
                println!("generation {}", generation);
            }
            store.save().await?;
        }

        Command::Chunks { id, start, end, incremental } => {
            let request = ChunkRequest {
                id,
                start_timestamp: start,
                end_timestamp: end,
                incremental_refresh: incremental,
            };
            let response = fetch_chunks(store.as_ref(), &config.tables.data, &request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Export { kind, input, output } => {
            let body = match kind {
                ExportKind::MachineInformation => export::machine_information_csv(store.as_ref(), &config.tables).await?,
                ExportKind::MachineConfig => export::machine_config_csv(store.as_ref(), &config.tables).await?,
                ExportKind::Messages => {
                    let input = input.ok_or_else(|| anyhow!("--input is required for the messages export"))?;
                    let records = load_batch_file(&input).await?;
                    export::normalize_records(store.as_ref(), &config.tables, &records)
                        .await?
                        .iter()
                        .map(serde_json::to_string)
                        .collect::<Result<Vec<_>, _>>()?
                        .join("\n")
                }
            };

            match output {
                Some(path) => tokio::fs::write(&path, body)
                    .await
                    .with_context(|| format!("Failed to write '{}'", path.display()))?,
                None => println!("{}", body),
            }
        }
    }

    Ok(())
}

async fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read records file '{}'", path.display()))?;

    match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect(),
        single => Ok(vec![serde_json::from_value(single)?]),
    }
}

/// Configuration records live in the config table, reference records in
/// the UI reference table.
fn table_for<'a>(config: &'a Config, record: &Record) -> anyhow::Result<&'a str> {
    match RecordType::of(record) {
        Some(RecordType::MessageFormat | RecordType::MachineConfig | RecordType::CacheGeneration) => {
            Ok(&config.tables.config)
        }
        Some(RecordType::UiReferenceMapping | RecordType::Machine) => Ok(&config.tables.ui_reference),
        Some(RecordType::Other(other)) => Err(anyhow!("Unsupported record type '{}'", other)),
        None => Err(anyhow!("Record has no type")),
    }
}

fn record_key(record: &Record) -> anyhow::Result<ItemKey> {
    let id = text_attr(record, attr::ID).ok_or_else(|| anyhow!("Record has no id"))?;
    let record_type = text_attr(record, attr::TYPE).ok_or_else(|| anyhow!("Record has no type"))?;
    Ok(ItemKey::typed(id, record_type))
}
