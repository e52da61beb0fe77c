use crate::model::MachineStatus;

use serde::{Deserialize, Serialize};

/// Status shown for a chunk. `Unknown` until an observation lands in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusValue {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "IDLE")]
    Idle,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl From<MachineStatus> for StatusValue {
    fn from(status: MachineStatus) -> Self {
        match status {
            MachineStatus::Up => Self::Up,
            MachineStatus::Down => Self::Down,
            MachineStatus::Idle => Self::Idle,
        }
    }
}

/// One fixed-width display interval, identified by its closing boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    #[serde(rename = "dataAsOfUTCUnixTimestamp")]
    pub data_as_of: i64,
    pub status_value: StatusValue,
    pub production_count_value: Option<f64>,
}

impl Chunk {
    pub fn empty(data_as_of: i64) -> Self {
        Self {
            data_as_of,
            status_value: StatusValue::Unknown,
            production_count_value: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.status_value != StatusValue::Unknown || self.production_count_value.is_some()
    }
}
