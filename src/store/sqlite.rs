use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::{strip_nulls, Record, Store, StoreError, Table, BATCH_WRITE_LIMIT};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new().connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Missing files are created on first connect.
    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;
    Ok(())
}

/// [`Store`] over a single SQLite `records` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn decode(body: &str) -> Result<Record, StoreError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAMap),
    }
}

const UPSERT: &str = "INSERT INTO records (table_name, pk, body) VALUES (?, ?, ?) \
     ON CONFLICT(table_name, pk) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP";

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip_all, fields(table = %table.name))]
    async fn get(&self, table: &Table, key: &Record) -> Result<Option<Record>, StoreError> {
        let pk = table.primary_key(key)?;
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM records WHERE table_name = ? AND pk = ?")
                .bind(&table.name)
                .bind(&pk)
                .fetch_optional(&self.pool)
                .await?;
        body.as_deref().map(decode).transpose()
    }

    #[instrument(skip_all, fields(table = %table.name))]
    async fn put(&self, table: &Table, mut record: Record) -> Result<(), StoreError> {
        strip_nulls(&mut record);
        let pk = table.primary_key(&record)?;
        let body = serde_json::to_string(&record)?;
        sqlx::query(UPSERT)
            .bind(&table.name)
            .bind(&pk)
            .bind(&body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table.name, count = records.len()))]
    async fn put_batch(&self, table: &Table, records: Vec<Record>) -> Result<(), StoreError> {
        let mut rows = Vec::with_capacity(records.len());
        for mut record in records {
            strip_nulls(&mut record);
            let pk = table.primary_key(&record)?;
            rows.push((pk, serde_json::to_string(&record)?));
        }
        for (i, chunk) in rows.chunks(BATCH_WRITE_LIMIT).enumerate() {
            let mut tx = self.pool.begin().await?;
            for (pk, body) in chunk {
                sqlx::query(UPSERT)
                    .bind(&table.name)
                    .bind(pk)
                    .bind(body)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            debug!(chunk = i, size = chunk.len(), "batch chunk written");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table.name))]
    async fn delete_item(&self, table: &Table, key: &Record) -> Result<(), StoreError> {
        let pk = table.primary_key(key)?;
        sqlx::query("DELETE FROM records WHERE table_name = ? AND pk = ?")
            .bind(&table.name)
            .bind(&pk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(table = %table.name, index = %index))]
    async fn index_query(
        &self,
        table: &Table,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let attribute = table.index_attribute(index)?;
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM records \
             WHERE table_name = ? AND json_extract(body, ?) = json_extract(?, '$') \
             ORDER BY pk",
        )
        .bind(&table.name)
        .bind(format!("$.{}", attribute))
        .bind(serde_json::to_string(value)?)
        .fetch_all(&self.pool)
        .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }
}
