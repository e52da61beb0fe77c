//! Read-side chunk query: loads a machine's observations for a display
//! window and aggregates them.

use super::{aggregate, total_production_count, Point, BUCKET_SECONDS};
use crate::error::QueryError;
use crate::model::{attr, text_attr, Chunk, MachineStatus, ObservationKind, Record};
use crate::store::{query_all, KeyValueStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest window a single request may cover: 31 days of one-minute chunks.
pub const MAX_WINDOW_SECONDS: i64 = 31 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub id: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    #[serde(default)]
    pub incremental_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub id: String,
    pub chunks: Vec<Chunk>,
    pub total_production_count: f64,
}

/// Builds the display chunks for one machine.
///
/// An incremental refresh only returns chunks that carry data. The total is
/// always computed over the whole window.
pub async fn fetch_chunks<S>(store: &S, table: &str, request: &ChunkRequest) -> Result<ChunkResponse, QueryError>
where
    S: KeyValueStore + ?Sized,
{
    let machine_id = request.id.trim();
    if machine_id.is_empty() {
        return Err(QueryError::BlankId);
    }

    let (start, end) = (request.start_timestamp, request.end_timestamp);
    if end < start {
        return Err(QueryError::InvalidWindow { start, end });
    }
    if end.saturating_sub(start) > MAX_WINDOW_SECONDS {
        return Err(QueryError::WindowTooLarge {
            seconds: end.saturating_sub(start),
            limit: MAX_WINDOW_SECONDS,
        });
    }

    let status_items = query_all(
        store,
        table,
        &ObservationKind::Status.partition_key(machine_id),
        start,
        end,
    )
    .await?;
    let count_items = query_all(
        store,
        table,
        &ObservationKind::ProductionCount.partition_key(machine_id),
        start,
        end,
    )
    .await?;

    let status: Vec<Point<MachineStatus>> = status_items.iter().filter_map(status_point).collect();
    let counts: Vec<Point<f64>> = count_items.iter().filter_map(count_point).collect();

    tracing::debug!(
        "Aggregating {} status and {} production count points for '{}'",
        status.len(),
        counts.len(),
        machine_id
    );

    let mut chunks = aggregate(&status, &counts, start, end, BUCKET_SECONDS);
    let total_production_count = total_production_count(&chunks);

    if request.incremental_refresh {
        chunks.retain(Chunk::has_data);
    }

    Ok(ChunkResponse {
        id: machine_id.to_string(),
        chunks,
        total_production_count,
    })
}

fn timestamp(item: &Record) -> Option<i64> {
    item.get(attr::TIMESTAMP).and_then(Value::as_i64)
}

fn status_point(item: &Record) -> Option<Point<MachineStatus>> {
    let status = text_attr(item, attr::STATUS).and_then(MachineStatus::parse)?;
    Some(Point::new(timestamp(item)?, status))
}

fn count_point(item: &Record) -> Option<Point<f64>> {
    let value = match item.get(attr::VALUE) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    };

    match value {
        Some(value) => Some(Point::new(timestamp(item)?, value)),
        None => {
            tracing::debug!("Skipping non-numeric production count {:?}", item.get(attr::VALUE));
            None
        }
    }
}
