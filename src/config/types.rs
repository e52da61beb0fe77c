//! Configuration Type Definitions
//!
//! Settings deserialised from the TOML configuration file. Every section and
//! field has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```toml
//! [store]
//! path = "floorwatch-store.json"
//! page_size = 100
//!
//! [tables]
//! config = "config"
//! ui_reference = "ui_reference"
//! data = "data"
//!
//! [mqtt]
//! broker_url = "mqtt://localhost:1883"
//! topics = ["factory/#"]
//! batch_size = 50
//! flush_interval_ms = 2000
//! ```

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub tables: TableConfig,

    /// Broker settings for `serve`. Absent when only batch files are ingested.
    pub mqtt: Option<MqttConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Snapshot file the store is loaded from and saved to.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Items returned per scan or query page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            page_size: default_page_size(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("floorwatch-store.json")
}

const fn default_page_size() -> usize {
    100
}

/// Table names.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TableConfig {
    #[serde(default = "default_config_table")]
    pub config: String,

    #[serde(default = "default_ui_reference_table")]
    pub ui_reference: String,

    #[serde(default = "default_data_table")]
    pub data: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            config: default_config_table(),
            ui_reference: default_ui_reference_table(),
            data: default_data_table(),
        }
    }
}

fn default_config_table() -> String {
    "config".to_string()
}

fn default_ui_reference_table() -> String {
    "ui_reference".to_string()
}

fn default_data_table() -> String {
    "data".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MqttConfig {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Defaults to `floorwatch_{uuid}`.
    pub client_id: Option<String>,

    #[serde(default)]
    pub qos: u8,

    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Raw records collected before a batch is ingested.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time a partial batch waits before it is ingested.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            topics: default_topics(),
            client_id: None,
            qos: 0,
            clean_session: default_clean_session(),
            username: None,
            password: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["#".to_string()]
}

const fn default_clean_session() -> bool {
    true
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval_ms() -> u64 {
    1000
}
