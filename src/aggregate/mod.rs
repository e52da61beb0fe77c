//! Time-Bucket Aggregation
//!
//! Builds fixed-width display chunks from persisted status and
//! production-count observations.
//!
//! Each chunk is identified by its closing boundary. An observation lands in
//! the first chunk whose boundary is at or after its timestamp. Within a
//! chunk a DOWN status is sticky, while production counts are last-write-wins.

pub mod query;

pub use query::{fetch_chunks, ChunkRequest, ChunkResponse, MAX_WINDOW_SECONDS};

use crate::model::{Chunk, MachineStatus, StatusValue};

/// Width of a display chunk, in seconds.
pub const BUCKET_SECONDS: i64 = 60;

/// A timestamped value read back from the data table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<T> {
    pub timestamp: i64,
    pub value: T,
}

impl<T> Point<T> {
    pub fn new(timestamp: i64, value: T) -> Self {
        Self { timestamp, value }
    }
}

/// Closing boundaries of every chunk in `start..=end`. The first boundary is
/// one bucket past `start` rounded down.
pub fn boundaries(start: i64, end: i64, bucket_seconds: i64) -> Vec<i64> {
    if bucket_seconds <= 0 {
        return Vec::new();
    }

    let first = start.div_euclid(bucket_seconds) * bucket_seconds + bucket_seconds;
    std::iter::successors(Some(first), |b| b.checked_add(bucket_seconds))
        .take_while(|b| *b <= end)
        .collect()
}

pub fn aggregate(
    status: &[Point<MachineStatus>],
    counts: &[Point<f64>],
    start: i64,
    end: i64,
    bucket_seconds: i64,
) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = boundaries(start, end, bucket_seconds)
        .into_iter()
        .map(Chunk::empty)
        .collect();

    walk(&mut chunks, status, |chunk, status| {
        if chunk.status_value != StatusValue::Down {
            chunk.status_value = status.into();
        }
    });

    walk(&mut chunks, counts, |chunk, count| {
        chunk.production_count_value = Some(count);
    });

    chunks
}

/// Visits points in timestamp order, advancing a cursor over the chunks.
/// Points past the last boundary are dropped.
fn walk<T: Copy>(chunks: &mut [Chunk], points: &[Point<T>], mut apply: impl FnMut(&mut Chunk, T)) {
    let mut ordered: Vec<&Point<T>> = points.iter().collect();
    ordered.sort_by_key(|p| p.timestamp);

    let mut cursor = 0;
    for point in ordered {
        while cursor < chunks.len() && chunks[cursor].data_as_of < point.timestamp {
            cursor += 1;
        }
        let Some(chunk) = chunks.get_mut(cursor) else {
            break;
        };
        apply(chunk, point.value);
    }
}

/// Sums a counter across the chunks, treating every drop below the running
/// maximum as a reset.
pub fn total_production_count(chunks: &[Chunk]) -> f64 {
    let mut total = 0.0;
    let mut running: Option<f64> = None;

    for value in chunks.iter().filter_map(|c| c.production_count_value) {
        running = match running {
            Some(max) if value < max => {
                total += max;
                Some(value)
            }
            _ => Some(value),
        };
    }

    total + running.unwrap_or(0.0)
}
