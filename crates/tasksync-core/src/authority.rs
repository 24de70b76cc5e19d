//! Remote authority: resolves batches of client operations against the
//! server's own records using last-write-wins on `updated_at`.
//!
//! Rules per item, keyed by the client's task identifier:
//! - `delete` marks an existing record deleted, or inserts a tombstone.
//! - `create`/`update` with no record inserts a live record.
//! - `create`/`update` with a record applies only when the incoming
//!   `updated_at` is not older than the stored one (ties go to the incoming
//!   write). A losing write leaves the record untouched and is flagged as a
//!   conflict.
//!
//! A failure while resolving one item is reported on that item only.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::remote::{find_in_tx, insert_in_tx, update_in_tx, ServerStore, ServerTaskRecord};
use crate::error::{Result, TaskSyncError};
use crate::models::SyncOperation;
use crate::protocol::{
    BatchItem, BatchRequest, BatchResponse, ItemStatus, ProcessedItem, ResolvedRecord,
};
use crate::transport::SyncTransport;

/// Title stored when an incoming payload carries none.
pub const PLACEHOLDER_TITLE: &str = "Untitled Task";

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Largest batch accepted in one request.
    pub max_batch_items: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            max_batch_items: 500,
        }
    }
}

/// Loose view of a client payload; every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
struct IncomingTask {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Incoming payload with defaults filled in.
#[derive(Debug, Clone)]
struct NormalizedTask {
    title: String,
    description: Option<String>,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IncomingTask {
    fn parse(data: &serde_json::Value) -> std::result::Result<Self, serde_json::Error> {
        if data.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(data.clone())
    }

    fn normalize(self, now: DateTime<Utc>) -> NormalizedTask {
        NormalizedTask {
            title: self
                .title
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            description: self.description,
            completed: self.completed.unwrap_or(false),
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        }
    }
}

pub struct RemoteAuthority {
    store: ServerStore,
    config: AuthorityConfig,
}

impl RemoteAuthority {
    pub fn new(store: ServerStore, config: AuthorityConfig) -> Self {
        Self { store, config }
    }

    /// In-memory authority with default settings, for tests and demos.
    pub async fn in_memory() -> Result<Self> {
        let store = ServerStore::new_in_memory().await?;
        store.run_migrations().await?;
        Ok(Self::new(store, AuthorityConfig::default()))
    }

    pub fn store(&self) -> &ServerStore {
        &self.store
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Resolve every item of `request` in order.
    ///
    /// # Errors
    ///
    /// Only a batch larger than `max_batch_items` fails as a whole; item
    /// failures are reported inside the response.
    pub async fn process_batch(&self, request: &BatchRequest) -> Result<BatchResponse> {
        if request.items.len() > self.config.max_batch_items {
            return Err(TaskSyncError::validation(format!(
                "batch of {} items exceeds the limit of {}",
                request.items.len(),
                self.config.max_batch_items
            )));
        }

        let mut processed_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let verdict = match self.resolve_item(item).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    let client_id = client_id_hint(item);
                    tracing::warn!(client_id = %client_id, operation = %item.operation, error = %e, "failed to resolve batch item");
                    ProcessedItem::failed(client_id, item.operation, e.to_string())
                }
            };
            processed_items.push(verdict);
        }

        Ok(BatchResponse { processed_items })
    }

    async fn resolve_item(&self, item: &BatchItem) -> Result<ProcessedItem> {
        let payload = IncomingTask::parse(&item.data).map_err(|e| {
            TaskSyncError::item(client_id_hint(item), format!("malformed payload: {}", e))
        })?;
        let client_id = resolve_client_id(item.task_id.as_deref(), payload.id.as_deref())
            .ok_or_else(|| TaskSyncError::item("", "item carries no client id"))?;
        let incoming = payload.normalize(Utc::now());

        let mut tx = self.store.begin().await?;
        let existing = find_in_tx(&mut tx, &client_id).await?;
        let had_existing = existing.is_some();

        let record = match (item.operation, existing) {
            (SyncOperation::Delete, Some(mut record)) => {
                record.is_deleted = true;
                record.updated_at = record.updated_at.max(incoming.updated_at);
                update_in_tx(&mut tx, &record).await?;
                record
            }
            (SyncOperation::Delete, None) => {
                let record = new_record(&client_id, &incoming, true);
                insert_in_tx(&mut tx, &record).await?;
                record
            }
            (SyncOperation::Create | SyncOperation::Update, None) => {
                let record = new_record(&client_id, &incoming, false);
                insert_in_tx(&mut tx, &record).await?;
                record
            }
            (SyncOperation::Create | SyncOperation::Update, Some(mut record)) => {
                if incoming.updated_at >= record.updated_at {
                    // deletion is sticky: a winning write refreshes fields only
                    record.title = incoming.title.clone();
                    record.description = incoming.description.clone();
                    record.completed = incoming.completed;
                    record.updated_at = incoming.updated_at;
                    update_in_tx(&mut tx, &record).await?;
                }
                record
            }
        };

        tx.commit().await?;

        let conflict = had_existing && record.updated_at > incoming.updated_at;
        if conflict {
            tracing::debug!(client_id = %client_id, operation = %item.operation, "incoming write lost to newer record");
        }

        Ok(ProcessedItem {
            client_id,
            server_id: Some(record.id.clone()),
            status: ItemStatus::Success,
            resolved_data: Some(ResolvedRecord::from(&record)),
            operation: item.operation,
            conflict,
            error: None,
        })
    }
}

impl SyncTransport for RemoteAuthority {
    async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse> {
        self.process_batch(request).await.map_err(|e| match e {
            TaskSyncError::Transport(message) => TaskSyncError::Transport(message),
            other => TaskSyncError::transport(other.to_string()),
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}

fn resolve_client_id(task_id: Option<&str>, embedded: Option<&str>) -> Option<String> {
    [task_id, embedded]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

fn client_id_hint(item: &BatchItem) -> String {
    let embedded = item.data.get("id").and_then(|id| id.as_str());
    resolve_client_id(item.task_id.as_deref(), embedded).unwrap_or_default()
}

fn new_record(client_id: &str, incoming: &NormalizedTask, is_deleted: bool) -> ServerTaskRecord {
    ServerTaskRecord {
        id: Uuid::new_v4().to_string(),
        client_id: client_id.to_string(),
        title: incoming.title.clone(),
        description: incoming.description.clone(),
        completed: incoming.completed,
        is_deleted,
        created_at: incoming.created_at,
        updated_at: incoming.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn item(task_id: &str, operation: SyncOperation, data: serde_json::Value) -> BatchItem {
        BatchItem {
            task_id: Some(task_id.to_string()),
            operation,
            data,
            created_at: Some(Utc::now()),
            retry_count: 0,
        }
    }

    fn request(items: Vec<BatchItem>) -> BatchRequest {
        BatchRequest {
            items,
            client_timestamp: Utc::now(),
        }
    }

    fn payload(title: &str, updated_at: DateTime<Utc>) -> serde_json::Value {
        json!({
            "title": title,
            "description": null,
            "completed": false,
            "created_at": updated_at,
            "updated_at": updated_at,
        })
    }

    async fn single(authority: &RemoteAuthority, item: BatchItem) -> ProcessedItem {
        let mut response = authority.process_batch(&request(vec![item])).await.unwrap();
        assert_eq!(response.processed_items.len(), 1);
        response.processed_items.remove(0)
    }

    #[tokio::test]
    async fn test_create_inserts_live_record() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();

        let verdict = single(&authority, item("c1", SyncOperation::Create, payload("Buy milk", t0))).await;

        assert_eq!(verdict.status, ItemStatus::Success);
        assert_eq!(verdict.client_id, "c1");
        assert!(!verdict.conflict);
        let resolved = verdict.resolved_data.unwrap();
        assert_eq!(resolved.title, "Buy milk");
        assert_eq!(resolved.updated_at, t0);
        assert_eq!(Some(resolved.id), verdict.server_id);

        let stored = authority.store().find_by_client_id("c1").await.unwrap().unwrap();
        assert!(!stored.is_deleted);
    }

    #[tokio::test]
    async fn test_newer_update_wins() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);

        let created = single(&authority, item("c1", SyncOperation::Create, payload("Old", t0))).await;
        let updated = single(&authority, item("c1", SyncOperation::Update, payload("New", t1))).await;

        assert!(!updated.conflict);
        assert_eq!(updated.server_id, created.server_id);
        let resolved = updated.resolved_data.unwrap();
        assert_eq!(resolved.title, "New");
        assert_eq!(resolved.updated_at, t1);
    }

    #[tokio::test]
    async fn test_older_update_is_rejected_as_conflict() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();
        let t2 = t0 - Duration::seconds(10);

        single(&authority, item("c1", SyncOperation::Create, payload("Current", t0))).await;
        let verdict = single(&authority, item("c1", SyncOperation::Update, payload("Stale", t2))).await;

        assert_eq!(verdict.status, ItemStatus::Success);
        assert!(verdict.conflict);
        let resolved = verdict.resolved_data.unwrap();
        assert_eq!(resolved.title, "Current");
        assert_eq!(resolved.updated_at, t0);
    }

    #[tokio::test]
    async fn test_equal_timestamp_favors_incoming() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();

        single(&authority, item("c1", SyncOperation::Create, payload("First", t0))).await;
        let verdict = single(&authority, item("c1", SyncOperation::Update, payload("Second", t0))).await;

        assert!(!verdict.conflict);
        assert_eq!(verdict.resolved_data.unwrap().title, "Second");
    }

    #[tokio::test]
    async fn test_delete_unknown_creates_tombstone_that_blocks_older_create() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t_del = Utc::now();
        let t_old = t_del - Duration::minutes(1);

        let deleted = single(&authority, item("ghost", SyncOperation::Delete, payload("Ghost", t_del))).await;
        assert!(!deleted.conflict);
        assert!(deleted.resolved_data.as_ref().unwrap().is_deleted);

        let stray = single(&authority, item("ghost", SyncOperation::Create, payload("Ghost", t_old))).await;
        assert!(stray.conflict);
        assert_eq!(stray.server_id, deleted.server_id);

        let stored = authority.store().find_by_client_id("ghost").await.unwrap().unwrap();
        assert!(stored.is_deleted);
        assert_eq!(stored.updated_at, t_del);
        assert_eq!(authority.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_newer_update_does_not_resurrect_tombstone() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);

        single(&authority, item("c1", SyncOperation::Delete, payload("Gone", t0))).await;
        let verdict = single(&authority, item("c1", SyncOperation::Update, payload("Edited", t1))).await;

        let resolved = verdict.resolved_data.unwrap();
        assert!(resolved.is_deleted);
        assert_eq!(resolved.title, "Edited");
    }

    #[tokio::test]
    async fn test_delete_existing_never_moves_timestamp_back() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();
        let older = t0 - Duration::seconds(30);

        single(&authority, item("c1", SyncOperation::Create, payload("Keep", t0))).await;
        let verdict = single(&authority, item("c1", SyncOperation::Delete, payload("Keep", older))).await;

        let resolved = verdict.resolved_data.unwrap();
        assert!(resolved.is_deleted);
        assert_eq!(resolved.updated_at, t0);
        assert!(verdict.conflict);
    }

    #[tokio::test]
    async fn test_missing_fields_get_defaults() {
        let authority = RemoteAuthority::in_memory().await.unwrap();

        let verdict = single(&authority, item("bare", SyncOperation::Create, json!({}))).await;

        let resolved = verdict.resolved_data.unwrap();
        assert_eq!(resolved.title, PLACEHOLDER_TITLE);
        assert!(resolved.description.is_none());
        assert!(!resolved.completed);
    }

    #[tokio::test]
    async fn test_client_id_falls_back_to_payload_id() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let mut embedded = item("", SyncOperation::Create, json!({"id": "embedded-1", "title": "Embedded"}));
        embedded.task_id = None;

        let verdict = single(&authority, embedded).await;

        assert_eq!(verdict.status, ItemStatus::Success);
        assert_eq!(verdict.client_id, "embedded-1");
    }

    #[tokio::test]
    async fn test_bad_item_does_not_abort_batch() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t0 = Utc::now();
        let items = vec![
            item("ok-1", SyncOperation::Create, payload("Fine", t0)),
            item("broken", SyncOperation::Update, json!({"updated_at": "not a date"})),
            item("ok-2", SyncOperation::Create, payload("Also fine", t0)),
        ];

        let response = authority.process_batch(&request(items)).await.unwrap();

        let statuses: Vec<ItemStatus> = response.processed_items.iter().map(|p| p.status).collect();
        assert_eq!(statuses, vec![ItemStatus::Success, ItemStatus::Error, ItemStatus::Success]);
        let broken = &response.processed_items[1];
        assert_eq!(broken.client_id, "broken");
        assert!(broken.resolved_data.is_none());
        assert!(broken.error.is_some());
        assert_eq!(authority.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_item_without_client_id_is_an_error() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let mut anonymous = item("", SyncOperation::Create, json!({"title": "Who"}));
        anonymous.task_id = None;

        let verdict = single(&authority, anonymous).await;

        assert_eq!(verdict.status, ItemStatus::Error);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let store = ServerStore::new_in_memory().await.unwrap();
        store.run_migrations().await.unwrap();
        let authority = RemoteAuthority::new(store, AuthorityConfig { max_batch_items: 1 });
        let t0 = Utc::now();

        let result = authority
            .process_batch(&request(vec![
                item("a", SyncOperation::Create, payload("A", t0)),
                item("b", SyncOperation::Create, payload("B", t0)),
            ]))
            .await;

        assert!(matches!(result, Err(TaskSyncError::Validation(_))));
        assert_eq!(authority.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_two_updates_in_one_batch_apply_in_order() {
        let authority = RemoteAuthority::in_memory().await.unwrap();
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);

        let response = authority
            .process_batch(&request(vec![
                item("c1", SyncOperation::Update, payload("v1", t1)),
                item("c1", SyncOperation::Update, payload("v2", t2)),
            ]))
            .await
            .unwrap();

        let last = response.processed_items[1].resolved_data.clone().unwrap();
        assert_eq!(last.title, "v2");
        assert_eq!(last.updated_at, t2);
        assert!(!response.processed_items[1].conflict);
    }

    #[tokio::test]
    async fn test_concurrent_batches_for_one_client_id_both_resolve() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = ServerStore::new(&temp_dir.path().join("server.db")).await.unwrap();
        store.run_migrations().await.unwrap();
        let authority = RemoteAuthority::new(store, AuthorityConfig::default());
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(1);

        let first = request(vec![item("shared", SyncOperation::Create, payload("laptop", t1))]);
        let second = request(vec![item("shared", SyncOperation::Update, payload("phone", t2))]);
        let (a, b) = tokio::join!(
            authority.process_batch(&first),
            authority.process_batch(&second)
        );

        assert_eq!(a.unwrap().processed_items[0].status, ItemStatus::Success);
        assert_eq!(b.unwrap().processed_items[0].status, ItemStatus::Success);
        assert_eq!(authority.store().count().await.unwrap(), 1);
        let stored = authority.store().find_by_client_id("shared").await.unwrap().unwrap();
        assert_eq!(stored.title, "phone");
        assert_eq!(stored.updated_at, t2);
    }
}
