//! Server-side task records for the remote authority.
//!
//! `ServerStore` keeps one row per client task identifier. It does no conflict
//! resolution of its own; `RemoteAuthority` decides what to write.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};

use crate::db::local::{decode_ts, encode_ts};
use crate::error::{Result, TaskSyncError};

/// A task as the server sees it, keyed by the client's identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerTaskRecord {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ServerTaskRow {
    id: String,
    client_id: String,
    title: String,
    description: Option<String>,
    completed: i32,
    is_deleted: i32,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ServerTaskRow> for ServerTaskRecord {
    type Error = TaskSyncError;

    fn try_from(row: ServerTaskRow) -> Result<Self> {
        Ok(ServerTaskRecord {
            id: row.id,
            client_id: row.client_id,
            title: row.title,
            description: row.description,
            completed: row.completed != 0,
            is_deleted: row.is_deleted != 0,
            created_at: decode_ts(&row.created_at, "created_at")?,
            updated_at: decode_ts(&row.updated_at, "updated_at")?,
        })
    }
}

/// SQLite-backed storage for server task records.
#[derive(Clone)]
pub struct ServerStore {
    pool: SqlitePool,
}

impl ServerStore {
    /// Create an in-memory store for testing.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open (or create) a file-backed store.
    ///
    /// The pool holds a single connection so that the authority's
    /// read-then-write transactions never interleave.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS server_tasks (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_server_tasks_updated_at ON server_tasks(updated_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<ServerTaskRecord>> {
        let row: Option<ServerTaskRow> =
            sqlx::query_as("SELECT * FROM server_tasks WHERE client_id = ?1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ServerTaskRecord::try_from).transpose()
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM server_tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

/// Look up a record inside an open transaction.
pub async fn find_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    client_id: &str,
) -> Result<Option<ServerTaskRecord>> {
    let row: Option<ServerTaskRow> =
        sqlx::query_as("SELECT * FROM server_tasks WHERE client_id = ?1")
            .bind(client_id)
            .fetch_optional(&mut **tx)
            .await?;

    row.map(ServerTaskRecord::try_from).transpose()
}

pub async fn insert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    record: &ServerTaskRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO server_tasks (
            id, client_id, title, description, completed, is_deleted, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&record.id)
    .bind(&record.client_id)
    .bind(&record.title)
    .bind(&record.description)
    .bind(if record.completed { 1 } else { 0 })
    .bind(if record.is_deleted { 1 } else { 0 })
    .bind(encode_ts(record.created_at))
    .bind(encode_ts(record.updated_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Overwrite the mutable fields of an existing record.
pub async fn update_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    record: &ServerTaskRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE server_tasks SET
            title = ?1,
            description = ?2,
            completed = ?3,
            is_deleted = ?4,
            updated_at = ?5
        WHERE client_id = ?6
        "#,
    )
    .bind(&record.title)
    .bind(&record.description)
    .bind(if record.completed { 1 } else { 0 })
    .bind(if record.is_deleted { 1 } else { 0 })
    .bind(encode_ts(record.updated_at))
    .bind(&record.client_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> ServerStore {
        let store = ServerStore::new_in_memory().await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn record(client_id: &str) -> ServerTaskRecord {
        let now = Utc::now();
        ServerTaskRecord {
            id: format!("srv-{}", client_id),
            client_id: client_id.to_string(),
            title: "Server copy".to_string(),
            description: None,
            completed: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = setup_store().await;
        let rec = record("abc");

        let mut tx = store.begin().await.unwrap();
        insert_in_tx(&mut tx, &rec).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_by_client_id("abc").await.unwrap().unwrap();
        assert_eq!(found, rec);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_client_id_is_unique() {
        let store = setup_store().await;
        let rec = record("dup");

        let mut tx = store.begin().await.unwrap();
        insert_in_tx(&mut tx, &rec).await.unwrap();
        let mut second = rec.clone();
        second.id = "another-server-id".to_string();
        let result = insert_in_tx(&mut tx, &second).await;

        assert!(matches!(result, Err(TaskSyncError::Database(_))));
    }

    #[tokio::test]
    async fn test_update_overwrites_fields() {
        let store = setup_store().await;
        let mut rec = record("edit");

        let mut tx = store.begin().await.unwrap();
        insert_in_tx(&mut tx, &rec).await.unwrap();
        rec.title = "Edited".to_string();
        rec.completed = true;
        rec.updated_at = rec.updated_at + chrono::Duration::seconds(5);
        update_in_tx(&mut tx, &rec).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_by_client_id("edit").await.unwrap().unwrap();
        assert_eq!(found.title, "Edited");
        assert!(found.completed);
        assert_eq!(found.updated_at, rec.updated_at);
    }

    #[tokio::test]
    async fn test_rolled_back_insert_is_absent() {
        let store = setup_store().await;

        let mut tx = store.begin().await.unwrap();
        insert_in_tx(&mut tx, &record("temp")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.find_by_client_id("temp").await.unwrap().is_none());
    }
}
