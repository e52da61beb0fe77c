//! In-Memory Store
//!
//! A `KeyValueStore` held in ordered maps, optionally backed by a JSON
//! snapshot file so the command-line tools can share state between runs.

use super::{AttributePatch, ItemKey, KeyValueStore, Page, SortKey, BATCH_WRITE_LIMIT};
use crate::config::TableConfig;
use crate::error::StoreError;
use crate::model::{attr, Record};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// How a table's sort attribute is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    Text,
    Number,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub sort_attribute: String,
    pub sort_kind: SortKind,
}

impl TableSchema {
    /// Configuration-style table keyed by (`id`, `type`).
    pub fn typed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sort_attribute: attr::TYPE.to_string(),
            sort_kind: SortKind::Text,
        }
    }

    /// Time-series table keyed by (`id`, `timestamp`).
    pub fn timestamped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sort_attribute: attr::TIMESTAMP.to_string(),
            sort_kind: SortKind::Number,
        }
    }

    /// The three tables named in the configuration file.
    pub fn for_tables(tables: &TableConfig) -> Vec<Self> {
        vec![
            Self::typed(&tables.config),
            Self::typed(&tables.ui_reference),
            Self::timestamped(&tables.data),
        ]
    }

    fn key_of(&self, record: &Record) -> Result<ItemKey, StoreError> {
        let id = record
            .get(attr::ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::MissingKey(attr::ID.to_string()))?;

        let sort = record
            .get(&self.sort_attribute)
            .and_then(|v| match self.sort_kind {
                SortKind::Text => v.as_str().map(|s| SortKey::Text(s.to_string())),
                SortKind::Number => v.as_i64().map(SortKey::Number),
            })
            .ok_or_else(|| StoreError::MissingKey(self.sort_attribute.clone()))?;

        Ok(ItemKey {
            id: id.to_string(),
            sort,
        })
    }

    fn key_attributes(&self, key: &ItemKey) -> [(String, Value); 2] {
        let sort = match &key.sort {
            SortKey::Text(s) => Value::from(s.clone()),
            SortKey::Number(n) => Value::from(*n),
        };

        [
            (attr::ID.to_string(), Value::from(key.id.clone())),
            (self.sort_attribute.clone(), sort),
        ]
    }
}

struct Table {
    schema: TableSchema,
    items: BTreeMap<ItemKey, Record>,
}

pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    page_size: usize,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(schemas: Vec<TableSchema>, page_size: usize) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| {
                (
                    schema.name.clone(),
                    Table {
                        schema,
                        items: BTreeMap::new(),
                    },
                )
            })
            .collect();

        Self {
            tables: Mutex::new(tables),
            page_size: page_size.max(1),
            snapshot: None,
        }
    }

    /// Creates a store backed by a snapshot file, loading it if it exists.
    pub async fn open(
        path: impl AsRef<Path>,
        schemas: Vec<TableSchema>,
        page_size: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::new(schemas, page_size);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let snapshot: HashMap<String, Vec<Record>> = serde_json::from_str(&content)?;
                let mut tables = store.tables.lock().await;

                for (name, records) in snapshot {
                    let Some(table) = tables.get_mut(&name) else {
                        tracing::warn!("Ignoring unknown table '{}' in snapshot", name);
                        continue;
                    };
                    for record in records {
                        let key = table.schema.key_of(&record)?;
                        table.items.insert(key, record);
                    }
                }
                drop(tables);
                tracing::info!("Loaded store snapshot from '{}'", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No store snapshot at '{}', starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        store.snapshot = Some(path);
        Ok(store)
    }

    /// Writes the snapshot file, if the store has one.
    pub async fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let content = {
            let tables = self.tables.lock().await;
            let snapshot: BTreeMap<&String, Vec<&Record>> = tables
                .iter()
                .map(|(name, table)| (name, table.items.values().collect()))
                .collect();
            serde_json::to_string_pretty(&snapshot)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!("Store snapshot written to '{}'", path.display());
        Ok(())
    }

    /// Number of items in a table.
    pub async fn len(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.len())
    }

    fn encode_token(key: &ItemKey) -> String {
        match &key.sort {
            SortKey::Text(s) => format!("{}\u{1f}t:{}", key.id, s),
            SortKey::Number(n) => format!("{}\u{1f}n:{}", key.id, n),
        }
    }

    fn decode_token(token: &str) -> Result<ItemKey, StoreError> {
        let invalid = || StoreError::InvalidContinuation(token.to_string());

        let (id, sort) = token.split_once('\u{1f}').ok_or_else(invalid)?;
        let sort = if let Some(text) = sort.strip_prefix("t:") {
            SortKey::Text(text.to_string())
        } else if let Some(number) = sort.strip_prefix("n:") {
            SortKey::Number(number.parse().map_err(|_| invalid())?)
        } else {
            return Err(invalid());
        };

        Ok(ItemKey {
            id: id.to_string(),
            sort,
        })
    }

    fn paginate<'a>(
        &self,
        entries: impl Iterator<Item = (&'a ItemKey, &'a Record)>,
    ) -> Page {
        let mut items = Vec::new();
        let mut last_key = None;
        let mut more = false;

        for (key, record) in entries {
            if items.len() == self.page_size {
                more = true;
                break;
            }
            items.push(record.clone());
            last_key = Some(key);
        }

        Page {
            items,
            continuation: if more { last_key.map(Self::encode_token) } else { None },
        }
    }
}

fn lower_bound(continuation: Option<&str>) -> Result<Bound<ItemKey>, StoreError> {
    Ok(match continuation {
        Some(token) => Bound::Excluded(MemoryStore::decode_token(token)?),
        None => Bound::Unbounded,
    })
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.get(key).cloned())
    }

    async fn put(&self, table: &str, item: Record) -> Result<Option<Record>, StoreError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let key = table.schema.key_of(&item)?;
        Ok(table.items.insert(key, item))
    }

    async fn update(
        &self,
        table: &str,
        key: &ItemKey,
        patch: &AttributePatch,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let key_attributes = table.schema.key_attributes(key);
        let item = table.items.entry(key.clone()).or_default();
        let previous = if item.is_empty() { None } else { Some(item.clone()) };

        patch.apply(item);
        item.extend(key_attributes);

        Ok(previous)
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<Option<Record>, StoreError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.remove(key))
    }

    async fn increment(&self, table: &str, key: &ItemKey, field: &str, by: u64) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let key_attributes = table.schema.key_attributes(key);
        let item = table.items.entry(key.clone()).or_default();
        let next = item.get(field).and_then(Value::as_u64).unwrap_or(0).saturating_add(by);

        item.insert(field.to_string(), Value::from(next));
        item.extend(key_attributes);

        Ok(next)
    }

    async fn scan(
        &self,
        table: &str,
        record_type: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<Page, StoreError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let entries = table
            .items
            .range((lower_bound(continuation)?, Bound::Unbounded))
            .filter(|(_, record)| match record_type {
                Some(t) => record.get(attr::TYPE).and_then(Value::as_str) == Some(t),
                None => true,
            });

        Ok(self.paginate(entries))
    }

    async fn query_range(
        &self,
        table: &str,
        id: &str,
        from: i64,
        to: i64,
        continuation: Option<&str>,
    ) -> Result<Page, StoreError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        if from > to {
            return Ok(Page::default());
        }

        let last = ItemKey::timestamped(id, to);
        let start = match lower_bound(continuation)? {
            Bound::Excluded(after) if after >= last => return Ok(Page::default()),
            Bound::Unbounded => Bound::Included(ItemKey::timestamped(id, from)),
            excluded => excluded,
        };

        Ok(self.paginate(table.items.range((start, Bound::Included(last)))))
    }

    async fn batch_write(&self, table: &str, items: Vec<Record>) -> Result<(), StoreError> {
        if items.len() > BATCH_WRITE_LIMIT {
            return Err(StoreError::BatchTooLarge(items.len(), BATCH_WRITE_LIMIT));
        }

        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        // Validate every key before writing any item.
        let keyed = items
            .into_iter()
            .map(|item| table.schema.key_of(&item).map(|key| (key, item)))
            .collect::<Result<Vec<_>, _>>()?;

        table.items.extend(keyed);
        Ok(())
    }
}
