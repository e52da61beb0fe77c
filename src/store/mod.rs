//! Key-Value Store Interface
//!
//! The persistence collaborator: items keyed by `id` plus a per-table sort
//! attribute, paginated scans and range queries driven by continuation
//! tokens, attribute-patch updates and size-limited batch writes.

pub mod memory;
pub mod patch;

pub use memory::MemoryStore;
pub use patch::AttributePatch;

use crate::error::StoreError;
use crate::model::{attr, Record};

use async_trait::async_trait;

/// Maximum number of items a single `batch_write` may carry.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Secondary half of an item key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKey {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub id: String,
    pub sort: SortKey,
}

impl ItemKey {
    pub fn typed(id: &str, record_type: &str) -> Self {
        Self {
            id: id.to_string(),
            sort: SortKey::Text(record_type.to_string()),
        }
    }

    pub fn timestamped(id: &str, timestamp: i64) -> Self {
        Self {
            id: id.to_string(),
            sort: SortKey::Number(timestamp),
        }
    }
}

/// One page of results and the token to fetch the next, if any.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Record>,
    pub continuation: Option<String>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Record>, StoreError>;

    /// Writes a whole item, returning the previous one.
    async fn put(&self, table: &str, item: Record) -> Result<Option<Record>, StoreError>;

    /// Applies a patch, creating the item if it does not exist. Returns the
    /// item as it was before the update.
    async fn update(
        &self,
        table: &str,
        key: &ItemKey,
        patch: &AttributePatch,
    ) -> Result<Option<Record>, StoreError>;

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<Option<Record>, StoreError>;

    /// Adds `by` to a numeric attribute as a single store operation, creating
    /// the item if it does not exist. Returns the new value.
    async fn increment(&self, table: &str, key: &ItemKey, field: &str, by: u64) -> Result<u64, StoreError>;

    /// Scans a table, optionally keeping only items whose `type` matches.
    async fn scan(
        &self,
        table: &str,
        record_type: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<Page, StoreError>;

    /// Items under one id with a numeric sort key in `from..=to`, ascending.
    async fn query_range(
        &self,
        table: &str,
        id: &str,
        from: i64,
        to: i64,
        continuation: Option<&str>,
    ) -> Result<Page, StoreError>;

    /// Writes up to [`BATCH_WRITE_LIMIT`] items.
    async fn batch_write(&self, table: &str, items: Vec<Record>) -> Result<(), StoreError>;
}

/// Scans every page of a table, handing each item to `handler`.
pub async fn scan_with_handler<S, F>(
    store: &S,
    table: &str,
    record_type: Option<&str>,
    mut handler: F,
) -> Result<usize, StoreError>
where
    S: KeyValueStore + ?Sized,
    F: FnMut(Record),
{
    let mut continuation: Option<String> = None;
    let mut count = 0;

    loop {
        let page = store.scan(table, record_type, continuation.as_deref()).await?;
        count += page.items.len();
        page.items.into_iter().for_each(&mut handler);

        match page.continuation {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    tracing::debug!("Scanned {} items from '{}'", count, table);
    Ok(count)
}

/// Collects every page of a range query.
pub async fn query_all<S>(store: &S, table: &str, id: &str, from: i64, to: i64) -> Result<Vec<Record>, StoreError>
where
    S: KeyValueStore + ?Sized,
{
    let mut continuation: Option<String> = None;
    let mut items = Vec::new();

    loop {
        let page = store
            .query_range(table, id, from, to, continuation.as_deref())
            .await?;
        items.extend(page.items);

        match page.continuation {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    Ok(items)
}

/// Writes items in groups of [`BATCH_WRITE_LIMIT`].
pub async fn batch_write_chunked<S>(store: &S, table: &str, items: Vec<Record>) -> Result<usize, StoreError>
where
    S: KeyValueStore + ?Sized,
{
    let total = items.len();
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk: Vec<Record> = items.by_ref().take(BATCH_WRITE_LIMIT).collect();
        tracing::debug!("Writing {} items to '{}'", chunk.len(), table);
        store.batch_write(table, chunk).await?;
    }

    Ok(total)
}

/// Writes the attributes of `record` that differ from the stored item as an
/// attribute patch. Attributes missing from `record` keep their stored value.
/// Returns the item before and after the write.
pub async fn patch_record<S>(
    store: &S,
    table: &str,
    key: &ItemKey,
    record: &Record,
) -> Result<(Option<Record>, Record), StoreError>
where
    S: KeyValueStore + ?Sized,
{
    let old = store.get(table, key).await?;
    let empty = Record::new();
    let patch = AttributePatch::diff(old.as_ref().unwrap_or(&empty), record, &[attr::ID, attr::TYPE]);

    if old.is_some() && patch.is_empty() {
        tracing::debug!("No attribute of '{}' in '{}' changed", key.id, table);
        return Ok((old.clone(), old.unwrap_or_default()));
    }

    store.update(table, key, &patch).await?;
    tracing::debug!(
        "Patched '{}' in '{}': {}",
        key.id,
        table,
        patch.fields().collect::<Vec<_>>().join(", ")
    );

    let new = store.get(table, key).await?.unwrap_or_else(|| record.clone());
    Ok((old, new))
}
