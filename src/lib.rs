//! Floorwatch
//!
//! Ingests tag/value telemetry from factory-floor machines, classifies it
//! against operator-defined message formats and machine rules, and serves
//! fixed-width status and production-count chunks for dashboards.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod parser;
pub mod reactor;
pub mod source;
pub mod store;
pub mod usage;
pub mod util;

pub use error::{ClassificationError, ConfigError, EnvError, QueryError, StoreError};
pub use ingest::{BatchSummary, Ingestor};
pub use parser::MachineDataParser;
pub use reactor::{ConfigChangeEvent, ConfigChangeReactor};
