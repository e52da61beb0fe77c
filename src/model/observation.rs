use crate::model::MachineStatus;
use crate::util::stringify_value;

use serde::Serialize;
use serde_json::Value;

/// What a persisted observation describes. Determines the data table
/// partition key, `{KIND}_{machineId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Status,
    ProductionCount,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::ProductionCount => "PRODUCTION_COUNT",
        }
    }

    pub fn partition_key(&self, machine_id: &str) -> String {
        format!("{}_{}", self.as_str(), machine_id)
    }
}

/// One sub-message extracted from a raw batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub machine_id: String,
    pub attribute_name: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub value: Value,
    pub quality: Value,
    #[serde(rename = "isStatusMsg")]
    pub is_status: bool,
    #[serde(rename = "isProductionCountMsg")]
    pub is_production_count: bool,
    #[serde(rename = "machineStatus", skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,
}

impl Observation {
    pub fn value_text(&self) -> String {
        stringify_value(&self.value)
    }

    /// The kinds this observation is persisted as. One tag may serve as both
    /// the status and the production-count tag.
    pub fn kinds(&self) -> impl Iterator<Item = ObservationKind> {
        [
            (self.is_status, ObservationKind::Status),
            (self.is_production_count, ObservationKind::ProductionCount),
        ]
        .into_iter()
        .filter_map(|(flagged, kind)| flagged.then_some(kind))
    }
}
