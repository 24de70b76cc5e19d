//! Local SQLite database for offline-first storage.
//!
//! `LocalDb` owns two tables: `tasks`, the durable task store, and
//! `sync_queue`, the ordered log of mutations waiting for reconciliation.
//! Every task mutation writes its queue entry in the same transaction.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use uuid::Uuid;

use crate::error::{Result, TaskSyncError};
use crate::models::{
    NewTask, SyncOperation, SyncQueueEntry, SyncStatus, Task, TaskSnapshot, TaskUpdate,
};

/// Fixed-width RFC 3339 so that text ordering in SQLite matches time ordering.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskSyncError::Decode(format!("invalid {} '{}': {}", field, value, e)))
}

fn decode_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| TaskSyncError::Decode(format!("invalid {} '{}': {}", field, value, e)))
}

/// Helper struct for mapping task rows from SQLite.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    completed: i32,
    created_at: String,
    updated_at: String,
    is_deleted: i32,
    sync_status: String,
    server_id: Option<String>,
    last_synced_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = TaskSyncError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: decode_uuid(&row.id, "task id")?,
            title: row.title,
            description: row.description,
            completed: row.completed != 0,
            created_at: decode_ts(&row.created_at, "created_at")?,
            updated_at: decode_ts(&row.updated_at, "updated_at")?,
            is_deleted: row.is_deleted != 0,
            sync_status: SyncStatus::from_str(&row.sync_status)?,
            server_id: row.server_id,
            last_synced_at: row
                .last_synced_at
                .map(|s| decode_ts(&s, "last_synced_at"))
                .transpose()?,
        })
    }
}

/// Helper struct for mapping queue rows from SQLite.
#[derive(Debug, FromRow)]
struct QueueRow {
    id: String,
    task_id: String,
    operation: String,
    data: String,
    created_at: String,
    retry_count: i64,
    error_message: Option<String>,
}

impl TryFrom<QueueRow> for SyncQueueEntry {
    type Error = TaskSyncError;

    fn try_from(row: QueueRow) -> Result<Self> {
        let data: TaskSnapshot = serde_json::from_str(&row.data)
            .map_err(|e| TaskSyncError::Decode(format!("invalid queue snapshot: {}", e)))?;
        Ok(SyncQueueEntry {
            id: decode_uuid(&row.id, "queue entry id")?,
            task_id: decode_uuid(&row.task_id, "task_id")?,
            operation: SyncOperation::from_str(&row.operation)?,
            data,
            created_at: decode_ts(&row.created_at, "created_at")?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(u32::MAX),
            error_message: row.error_message,
        })
    }
}

const QUEUE_COLUMNS: &str =
    "id, task_id, operation, data, created_at, retry_count, error_message";

/// Local SQLite database for offline-first storage.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Create an in-memory database for testing.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create a file-based database at the specified path.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations to create tables and indexes.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                sync_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (sync_status IN ('pending', 'synced', 'error')),
                server_id TEXT,
                last_synced_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // seq breaks created_at ties in insertion order
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_sync_status ON tasks(sync_status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_is_deleted ON tasks(is_deleted)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_created_at ON sync_queue(created_at, seq)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_queue_task_id ON sync_queue(task_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Task Operations ====================

    /// Create a task and enqueue its `create` operation atomically.
    pub async fn create_task(&self, input: NewTask) -> Result<Task> {
        let task = Task::new(input)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, title, description, completed, created_at, updated_at,
                is_deleted, sync_status, server_id, last_synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(if task.completed { 1 } else { 0 })
        .bind(encode_ts(task.created_at))
        .bind(encode_ts(task.updated_at))
        .bind(if task.is_deleted { 1 } else { 0 })
        .bind(task.sync_status.as_str())
        .bind(&task.server_id)
        .bind(task.last_synced_at.map(encode_ts))
        .execute(&mut *tx)
        .await?;
        enqueue(&mut tx, SyncOperation::Create, &task).await?;
        tx.commit().await?;

        tracing::debug!(task_id = %task.id, "created task");
        Ok(task)
    }

    /// Get an active (not soft-deleted) task by its ID.
    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = ?1 AND is_deleted = 0")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Task::try_from).transpose()
    }

    /// Get a task by its ID, including soft-deleted ones.
    pub async fn get_task_any(&self, id: Uuid) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    /// Apply a partial update and enqueue an `update` operation atomically.
    ///
    /// # Errors
    ///
    /// `NotFound` when the task is absent or soft-deleted, `Validation` when the
    /// resulting title would be empty. Neither case writes a queue entry.
    pub async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task> {
        let mut tx = self.pool.begin().await?;
        let mut task = fetch_task(&mut tx, id)
            .await?
            .filter(|task| !task.is_deleted)
            .ok_or_else(|| TaskSyncError::not_found(format!("task {}", id)))?;

        task.apply(update)?;
        write_mutation(&mut tx, &task).await?;
        enqueue(&mut tx, SyncOperation::Update, &task).await?;
        tx.commit().await?;

        tracing::debug!(task_id = %task.id, "updated task");
        Ok(task)
    }

    /// Soft-delete a task and enqueue a `delete` operation atomically.
    pub async fn delete_task(&self, id: Uuid) -> Result<Task> {
        let mut tx = self.pool.begin().await?;
        let mut task = fetch_task(&mut tx, id)
            .await?
            .ok_or_else(|| TaskSyncError::not_found(format!("task {}", id)))?;

        task.mark_deleted();
        write_mutation(&mut tx, &task).await?;
        enqueue(&mut tx, SyncOperation::Delete, &task).await?;
        tx.commit().await?;

        tracing::debug!(task_id = %task.id, "deleted task");
        Ok(task)
    }

    /// List active tasks, newest first.
    pub async fn list_active(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE is_deleted = 0 ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    /// List tasks that are pending or errored, including soft-deleted ones.
    pub async fn list_needing_sync(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE sync_status IN ('pending', 'error') ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    /// Record a successful round-trip for `entry`: the queue entry is removed
    /// and the task takes the server's id and timestamp. The task only becomes
    /// `synced` once no other queue entries remain for it.
    pub async fn complete_entry(
        &self,
        entry: &SyncQueueEntry,
        server_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<SyncStatus> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(entry.id.to_string())
            .execute(&mut *tx)
            .await?;

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE task_id = ?1")
            .bind(entry.task_id.to_string())
            .fetch_one(&mut *tx)
            .await?;

        let status = if remaining == 0 {
            sqlx::query(
                r#"
                UPDATE tasks SET
                    sync_status = 'synced',
                    server_id = ?1,
                    last_synced_at = ?2,
                    updated_at = ?2
                WHERE id = ?3
                "#,
            )
            .bind(server_id)
            .bind(encode_ts(resolved_at))
            .bind(entry.task_id.to_string())
            .execute(&mut *tx)
            .await?;
            SyncStatus::Synced
        } else {
            sqlx::query(
                r#"
                UPDATE tasks SET
                    sync_status = 'pending',
                    server_id = ?1,
                    last_synced_at = ?2
                WHERE id = ?3
                "#,
            )
            .bind(server_id)
            .bind(encode_ts(resolved_at))
            .bind(entry.task_id.to_string())
            .execute(&mut *tx)
            .await?;
            SyncStatus::Pending
        };

        tx.commit().await?;
        Ok(status)
    }

    /// Move a task to the terminal `error` sync state.
    pub async fn mark_task_error(&self, task_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE tasks SET sync_status = 'error' WHERE id = ?1")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Most recent `last_synced_at` across all tasks.
    pub async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar("SELECT MAX(last_synced_at) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        value.map(|s| decode_ts(&s, "last_synced_at")).transpose()
    }

    // ==================== Sync Queue Operations ====================

    /// Oldest `limit` queue entries, in the order they were enqueued.
    pub async fn next_batch(&self, limit: u32) -> Result<Vec<SyncQueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sync_queue ORDER BY created_at ASC, seq ASC LIMIT ?1",
            QUEUE_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncQueueEntry::try_from).collect()
    }

    /// Every queue entry, including those that exhausted their retries.
    pub async fn list_queue(&self) -> Result<Vec<SyncQueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sync_queue ORDER BY created_at ASC, seq ASC",
            QUEUE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncQueueEntry::try_from).collect()
    }

    pub async fn queue_len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Number of entries whose retry counter reached `max_retries`.
    pub async fn exhausted_len(&self, max_retries: u32) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE retry_count >= ?1")
                .bind(i64::from(max_retries))
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    pub async fn count_queue_for_task(&self, task_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE task_id = ?1")
            .bind(task_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Record a rejected item: bump its retry counter and keep the message.
    /// Returns the entry as it is after the update.
    pub async fn record_entry_error(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<Option<SyncQueueEntry>> {
        let mut tx = self.pool.begin().await?;
        let entry = bump_retry(&mut tx, id, message).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Bump the retry counter of every entry in a batch that failed to reach
    /// the server. Returns the entries as they are after the update.
    pub async fn record_transport_failure(
        &self,
        ids: &[Uuid],
        message: &str,
    ) -> Result<Vec<SyncQueueEntry>> {
        let mut tx = self.pool.begin().await?;
        let mut updated = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some(entry) = bump_retry(&mut tx, *id, message).await? {
                updated.push(entry);
            }
        }

        tx.commit().await?;
        Ok(updated)
    }
}

async fn bump_retry(
    tx: &mut Transaction<'_, Sqlite>,
    id: Uuid,
    message: &str,
) -> Result<Option<SyncQueueEntry>> {
    sqlx::query(
        "UPDATE sync_queue SET retry_count = retry_count + 1, error_message = ?1 WHERE id = ?2",
    )
    .bind(message)
    .bind(id.to_string())
    .execute(&mut **tx)
    .await?;

    let row: Option<QueueRow> = sqlx::query_as(&format!(
        "SELECT {} FROM sync_queue WHERE id = ?1",
        QUEUE_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(SyncQueueEntry::try_from).transpose()
}

async fn fetch_task(tx: &mut Transaction<'_, Sqlite>, id: Uuid) -> Result<Option<Task>> {
    let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

    row.map(Task::try_from).transpose()
}

async fn write_mutation(tx: &mut Transaction<'_, Sqlite>, task: &Task) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tasks SET
            title = ?1,
            description = ?2,
            completed = ?3,
            is_deleted = ?4,
            updated_at = ?5,
            sync_status = ?6
        WHERE id = ?7
        "#,
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(if task.completed { 1 } else { 0 })
    .bind(if task.is_deleted { 1 } else { 0 })
    .bind(encode_ts(task.updated_at))
    .bind(task.sync_status.as_str())
    .bind(task.id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn enqueue(
    tx: &mut Transaction<'_, Sqlite>,
    operation: SyncOperation,
    task: &Task,
) -> Result<SyncQueueEntry> {
    let entry = SyncQueueEntry::new(operation, task);
    let data = serde_json::to_string(&entry.data)?;

    sqlx::query(
        r#"
        INSERT INTO sync_queue (id, task_id, operation, data, created_at, retry_count, error_message)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.task_id.to_string())
    .bind(entry.operation.as_str())
    .bind(data)
    .bind(encode_ts(entry.created_at))
    .bind(i64::from(entry.retry_count))
    .bind(&entry.error_message)
    .execute(&mut **tx)
    .await?;

    Ok(entry)
}
