pub mod authority;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod protocol;
pub mod sync;
pub mod transport;

pub use authority::{AuthorityConfig, RemoteAuthority};
pub use config::{Config, DatabaseConfig, SyncConfig};
pub use db::{LocalDb, ServerStore};
pub use error::{Result, TaskSyncError};
pub use models::*;
pub use protocol::{BatchRequest, BatchResponse, ItemStatus, ProcessedItem};
pub use sync::{SyncResult, SyncService, SyncStatusReport};
pub use transport::{HttpTransport, SyncTransport};
