//! Raw Batch Sources
//!
//! Where raw records come from: JSON batch files for one-shot ingestion, or
//! an MQTT subscription collected into batches.

pub mod file;
pub mod mqtt;

pub use file::load_batch_file;
pub use mqtt::MqttBatchSource;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// One raw record as delivered by the ingestion stream: base64 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub data: String,
}

impl RawRecord {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// Wraps raw payload bytes.
    pub fn encode(payload: &[u8]) -> Self {
        Self {
            data: BASE64.encode(payload),
        }
    }
}
