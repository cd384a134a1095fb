//! Key-value store abstraction: plain attribute-map records addressed by
//! table, primary key and secondary index.
//!
//! - `sqlite`: the SQLite-backed implementation used by the bot.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod sqlite;

pub use sqlite::{init_pool, run_migrations, SqliteStore};

pub type Record = Map<String, Value>;

/// Per-call item ceiling for batched writes.
pub const BATCH_WRITE_LIMIT: usize = 25;

pub const SHARE_GROUP_INDEX: &str = "shareGroupIndex";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record is missing key attribute `{0}`")]
    MissingKey(&'static str),
    #[error("table {table} has no index {index}")]
    UnknownIndex { table: String, index: String },
    #[error("record is not an attribute map")]
    NotAMap,
}

/// Logical table: name, key attributes, and index name -> attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub key: &'static [&'static str],
    pub indexes: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn index_attribute(&self, index: &str) -> Result<&'static str, StoreError> {
        self.indexes
            .iter()
            .find(|(name, _)| *name == index)
            .map(|(_, attr)| *attr)
            .ok_or_else(|| StoreError::UnknownIndex {
                table: self.name.clone(),
                index: index.to_string(),
            })
    }

    /// JSON array of the record's key attribute values.
    pub fn primary_key(&self, record: &Record) -> Result<String, StoreError> {
        let mut parts = Vec::with_capacity(self.key.len());
        for attr in self.key {
            let value = record
                .get(*attr)
                .filter(|v| !v.is_null())
                .ok_or(StoreError::MissingKey(*attr))?;
            parts.push(value.clone());
        }
        Ok(serde_json::to_string(&parts)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub backups: Table,
    pub configs: Table,
    pub share_groups: Table,
}

impl Tables {
    pub fn new(backups: &str, configs: &str, share_groups: &str) -> Self {
        Self {
            backups: Table {
                name: backups.to_string(),
                key: &["sourceKey", "id"],
                indexes: &[],
            },
            configs: Table {
                name: configs.to_string(),
                key: &["userID"],
                indexes: &[(SHARE_GROUP_INDEX, "shareGroup")],
            },
            share_groups: Table {
                name: share_groups.to_string(),
                key: &["id"],
                indexes: &[],
            },
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new("wbbu-backups", "wbbu-configs", "wbbu-share-groups")
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, table: &Table, key: &Record) -> Result<Option<Record>, StoreError>;

    async fn put(&self, table: &Table, record: Record) -> Result<(), StoreError>;

    /// Writes all records, split into sub-batches of at most
    /// [`BATCH_WRITE_LIMIT`] sent one after another.
    async fn put_batch(&self, table: &Table, records: Vec<Record>) -> Result<(), StoreError>;

    async fn delete_item(&self, table: &Table, key: &Record) -> Result<(), StoreError>;

    /// Records whose index attribute equals `value`.
    async fn index_query(
        &self,
        table: &Table,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Serializes an entity into a record, dropping null attributes.
pub fn to_record<T: Serialize>(entity: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(entity)? {
        Value::Object(mut map) => {
            strip_nulls(&mut map);
            Ok(map)
        }
        _ => Err(StoreError::NotAMap),
    }
}

pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Absent attributes are omitted, never written as null.
pub fn strip_nulls(record: &mut Record) {
    record.retain(|_, v| !v.is_null());
}

/// Builds a key record from attribute/value pairs.
pub fn key_of<const N: usize>(pairs: [(&str, Value); N]) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
