//! Wire types exchanged between the reconciler and the remote authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::remote::ServerTaskRecord;
use crate::error::Result;
use crate::models::{SyncOperation, SyncQueueEntry};

pub const BATCH_PATH: &str = "/api/sync/batch";
pub const HEALTH_PATH: &str = "/api/sync/health";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<BatchItem>,
    pub client_timestamp: DateTime<Utc>,
}

impl BatchRequest {
    /// Build a request from queue entries, shipping each entry's stored snapshot.
    pub fn from_entries(entries: &[SyncQueueEntry]) -> Result<Self> {
        let items = entries
            .iter()
            .map(BatchItem::from_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            items,
            client_timestamp: Utc::now(),
        })
    }
}

/// One queued operation. `data` stays raw JSON so that the authority can
/// reject a malformed payload for this item alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub task_id: Option<String>,
    pub operation: SyncOperation,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
}

impl BatchItem {
    pub fn from_entry(entry: &SyncQueueEntry) -> Result<Self> {
        Ok(Self {
            task_id: Some(entry.task_id.to_string()),
            operation: entry.operation,
            data: serde_json::to_value(&entry.data)?,
            created_at: Some(entry.created_at),
            retry_count: entry.retry_count,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub processed_items: Vec<ProcessedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Error,
}

/// The authority's verdict for one batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub client_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
    pub status: ItemStatus,
    #[serde(default)]
    pub resolved_data: Option<ResolvedRecord>,
    pub operation: SyncOperation,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessedItem {
    pub fn failed(client_id: impl Into<String>, operation: SyncOperation, error: String) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: None,
            status: ItemStatus::Error,
            resolved_data: None,
            operation,
            conflict: false,
            error: Some(error),
        }
    }

    /// Whether this verdict answers the queue entry `entry`.
    pub fn answers(&self, entry: &SyncQueueEntry) -> bool {
        self.operation == entry.operation
            && Uuid::parse_str(&self.client_id).is_ok_and(|id| id == entry.task_id)
    }
}

/// The server's current view of a record after resolving an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ServerTaskRecord> for ResolvedRecord {
    fn from(record: &ServerTaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            completed: record.completed,
            is_deleted: record.is_deleted,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
