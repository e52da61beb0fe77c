//! Configuration Module
//!
//! Three layers: the TOML file (tables, store, broker), strictly validated
//! environment settings, and typed views over configuration records.

pub mod env;
pub mod loader;
pub mod params;
pub mod traits;
pub mod types;
pub mod validation;

pub use traits::RecordConfig;

pub use env::{RetentionPolicy, RuntimeToggles};
pub use loader::{load_config, load_config_from_string};
pub use params::{extract_attr, extract_optional_text, extract_text};
pub use types::{Config, MqttConfig, StoreConfig, TableConfig};
pub use validation::validate_config;
