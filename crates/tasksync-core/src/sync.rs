//! Client-side reconciliation between the local sync queue and the remote authority.
//!
//! `SyncService` drains the queue oldest-first in batches, ships each batch
//! through a `SyncTransport`, and applies the per-item verdicts back onto the
//! local store. Callers must not run two `reconcile` calls concurrently
//! against the same database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, SyncConfig};
use crate::db::LocalDb;
use crate::error::{Result, TaskSyncError};
use crate::models::{SyncOperation, SyncQueueEntry};
use crate::protocol::{BatchRequest, ItemStatus, ProcessedItem};
use crate::transport::{HttpTransport, SyncTransport};

/// Outcome of one reconciliation pass.
///
/// `success` is false only when the batch could not be delivered at all;
/// item-level failures show up in `failed_items` and `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub synced_items: usize,
    pub failed_items: usize,
    pub errors: Vec<SyncErrorEntry>,
    /// Items the server resolved in favour of its own newer record.
    pub conflicts: Vec<ConflictResolution>,
}

impl SyncResult {
    fn empty() -> Self {
        Self {
            success: true,
            synced_items: 0,
            failed_items: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncErrorEntry {
    /// `None` for the aggregated entry of a failed batch delivery.
    pub task_id: Option<Uuid>,
    pub operation: Option<SyncOperation>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictResolution {
    pub task_id: Uuid,
    pub server_id: String,
    pub resolution: &'static str,
    pub resolved_updated_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Answer to a status query.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    /// All queue entries, whatever their retry state.
    pub pending_sync_count: u64,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub is_online: bool,
    pub sync_queue_size: u64,
    /// Entries whose retry counter reached the configured maximum.
    pub exhausted_entries: u64,
}

/// Reconciler for one local database.
pub struct SyncService<T> {
    local: LocalDb,
    transport: T,
    config: SyncConfig,
}

impl SyncService<HttpTransport> {
    /// Open the configured local database and an HTTP transport to the server.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db_path = config
            .local_db_path()
            .map_err(|e| TaskSyncError::Config(format!("Failed to get local db path: {}", e)))?;
        if let Some(parent) = db_path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                TaskSyncError::Config(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let local = LocalDb::new(&db_path).await?;
        local.run_migrations().await?;
        let transport = HttpTransport::new(&config.sync)?;

        Ok(Self::new(local, transport, config.sync.clone()))
    }
}

impl<T: SyncTransport> SyncService<T> {
    /// A zero `batch_size` or `max_retries` is raised to 1.
    pub fn new(local: LocalDb, transport: T, mut config: SyncConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.max_retries = config.max_retries.max(1);
        Self {
            local,
            transport,
            config,
        }
    }

    pub fn local(&self) -> &LocalDb {
        &self.local
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Advisory liveness probe, bounded by the probe timeout.
    pub async fn check_connectivity(&self) -> bool {
        tokio::time::timeout(self.config.probe_timeout(), self.transport.ping())
            .await
            .unwrap_or(false)
    }

    /// Run one drain-send-apply cycle.
    ///
    /// # Errors
    ///
    /// Only local storage failures are returned as `Err`. Transport and
    /// item failures are reported inside the `SyncResult`.
    pub async fn reconcile(&self) -> Result<SyncResult> {
        let batch = self.local.next_batch(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(SyncResult::empty());
        }

        tracing::debug!(items = batch.len(), "sending sync batch");
        let request = BatchRequest::from_entries(&batch)?;

        let delivery =
            tokio::time::timeout(self.config.request_timeout(), self.transport.send_batch(&request))
                .await
                .unwrap_or_else(|_| {
                    Err(TaskSyncError::transport(format!(
                        "batch request timed out after {}s",
                        self.config.request_timeout().as_secs()
                    )))
                });

        let response = match delivery {
            Ok(response) => response,
            Err(e) => return self.fail_batch(&batch, e).await,
        };

        let mut result = SyncResult::empty();
        let mut unanswered: Vec<Option<&SyncQueueEntry>> = batch.iter().map(Some).collect();

        for verdict in &response.processed_items {
            let slot = unanswered
                .iter_mut()
                .find(|slot| matches!(slot, Some(entry) if verdict.answers(entry)));
            let Some(entry) = slot.and_then(Option::take) else {
                tracing::warn!(client_id = %verdict.client_id, operation = %verdict.operation, "verdict does not match any entry in the batch");
                continue;
            };
            self.apply_verdict(entry, verdict, &mut result).await?;
        }

        for entry in unanswered.into_iter().flatten() {
            self.record_item_failure(entry, "no verdict returned for this item", &mut result)
                .await?;
        }

        tracing::info!(
            synced = result.synced_items,
            failed = result.failed_items,
            conflicts = result.conflicts.len(),
            "reconciliation finished"
        );
        Ok(result)
    }

    /// Report queue and connectivity state.
    pub async fn status(&self) -> Result<SyncStatusReport> {
        let queue_len = self.local.queue_len().await?;
        Ok(SyncStatusReport {
            pending_sync_count: queue_len,
            last_sync_timestamp: self.local.last_synced_at().await?,
            is_online: self.check_connectivity().await,
            sync_queue_size: queue_len,
            exhausted_entries: self.local.exhausted_len(self.config.max_retries).await?,
        })
    }

    async fn apply_verdict(
        &self,
        entry: &SyncQueueEntry,
        verdict: &ProcessedItem,
        result: &mut SyncResult,
    ) -> Result<()> {
        if verdict.status == ItemStatus::Error {
            let message = verdict
                .error
                .clone()
                .unwrap_or_else(|| "server failed to resolve item".to_string());
            return self.record_item_failure(entry, &message, result).await;
        }

        let server_id = verdict
            .server_id
            .clone()
            .or_else(|| verdict.resolved_data.as_ref().map(|r| r.id.clone()));
        let Some(server_id) = server_id else {
            return self
                .record_item_failure(entry, "success verdict carried no server id", result)
                .await;
        };
        let resolved_at = verdict
            .resolved_data
            .as_ref()
            .map(|r| r.updated_at)
            .unwrap_or(entry.data.updated_at);

        self.local.complete_entry(entry, &server_id, resolved_at).await?;
        result.synced_items += 1;

        if verdict.conflict {
            tracing::info!(
                task_id = %entry.task_id,
                server_id = %server_id,
                resolved_updated_at = %resolved_at,
                "conflict resolved using last-write-wins"
            );
            result.conflicts.push(ConflictResolution {
                task_id: entry.task_id,
                server_id,
                resolution: "last-write-wins",
                resolved_updated_at: resolved_at,
                timestamp: Utc::now(),
            });
        }

        Ok(())
    }

    async fn record_item_failure(
        &self,
        entry: &SyncQueueEntry,
        message: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        tracing::warn!(task_id = %entry.task_id, operation = %entry.operation, error = message, "sync item failed");
        if let Some(updated) = self.local.record_entry_error(entry.id, message).await? {
            self.mark_if_exhausted(&updated).await?;
        }
        result.failed_items += 1;
        result.errors.push(SyncErrorEntry {
            task_id: Some(entry.task_id),
            operation: Some(entry.operation),
            error: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn mark_if_exhausted(&self, entry: &SyncQueueEntry) -> Result<()> {
        if entry.retry_count >= self.config.max_retries {
            tracing::warn!(task_id = %entry.task_id, retries = entry.retry_count, "sync retries exhausted");
            self.local.mark_task_error(entry.task_id).await?;
        }
        Ok(())
    }

    async fn fail_batch(
        &self,
        batch: &[SyncQueueEntry],
        error: TaskSyncError,
    ) -> Result<SyncResult> {
        let message = match error {
            TaskSyncError::Transport(message) => message,
            other => other.to_string(),
        };
        tracing::warn!(items = batch.len(), error = %message, "sync batch could not be delivered");

        let ids: Vec<Uuid> = batch.iter().map(|entry| entry.id).collect();
        let updated = self.local.record_transport_failure(&ids, &message).await?;
        for entry in &updated {
            self.mark_if_exhausted(entry).await?;
        }

        Ok(SyncResult {
            success: false,
            synced_items: 0,
            failed_items: batch.len(),
            errors: vec![SyncErrorEntry {
                task_id: None,
                operation: None,
                error: message,
                timestamp: Utc::now(),
            }],
            conflicts: Vec::new(),
        })
    }
}
