//! Batch File Source
//!
//! Reads raw records from disk. Two layouts are accepted: a JSON array of
//! `{"data": ...}` objects, or one such object per line.

use super::RawRecord;

use anyhow::Context;
use std::path::Path;

pub async fn load_batch_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<RawRecord>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read batch file '{}'", path.display()))?;

    let records = parse_batch(&content)
        .with_context(|| format!("Failed to parse batch file '{}'", path.display()))?;

    tracing::info!("Loaded {} raw records from '{}'", records.len(), path.display());
    Ok(records)
}

pub fn parse_batch(content: &str) -> anyhow::Result<Vec<RawRecord>> {
    let trimmed = content.trim_start();

    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Line {} is not a raw record", n + 1))
        })
        .collect()
}
