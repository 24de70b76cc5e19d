//! Drives the HTTP surface with the real client transport.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tasksync_core::protocol::{BatchItem, BatchRequest};
use tasksync_core::{
    AuthorityConfig, HttpTransport, LocalDb, NewTask, RemoteAuthority, ServerStore, SyncConfig,
    SyncOperation, SyncService, SyncStatus, SyncTransport, TaskSyncError,
};
use tasksync_server::{app_router, AppState, ServerConfig};
use uuid::Uuid;

/// Serve a fresh in-memory authority on an ephemeral port. Returns the base url.
async fn spawn_server(max_batch_items: usize) -> String {
    let store = ServerStore::new_in_memory().await.unwrap();
    store.run_migrations().await.unwrap();
    let authority = RemoteAuthority::new(store, AuthorityConfig { max_batch_items });

    let config = Arc::new(ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        db_path: ":memory:".into(),
        max_batch_items,
    });
    let router = app_router(AppState::new(config, authority));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn client(base_url: &str) -> SyncService<HttpTransport> {
    let db = LocalDb::new_in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    let config = SyncConfig::default();
    let transport = HttpTransport::with_base_url(base_url, &config).unwrap();
    SyncService::new(db, transport, config)
}

#[tokio::test]
async fn test_health_probe_succeeds() {
    let base_url = spawn_server(500).await;
    let sync = client(&base_url).await;

    assert!(sync.check_connectivity().await);
}

#[tokio::test]
async fn test_reconcile_over_http() {
    let base_url = spawn_server(500).await;
    let sync = client(&base_url).await;
    let task = sync.local().create_task(NewTask::new("Buy milk")).await.unwrap();

    let result = sync.reconcile().await.unwrap();

    assert!(result.success);
    assert_eq!(result.synced_items, 1);
    let stored = sync.local().get_task(task.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert!(stored.server_id.is_some());
}

#[tokio::test]
async fn test_two_clients_converge_on_latest_write() {
    let base_url = spawn_server(500).await;
    let first = client(&base_url).await;
    let second = client(&base_url).await;
    let id = Uuid::new_v4();

    let older = Utc::now();
    let newer = older + chrono::Duration::seconds(30);
    let write = |title: &str, updated_at: DateTime<Utc>| BatchRequest {
        items: vec![BatchItem {
            task_id: Some(id.to_string()),
            operation: SyncOperation::Update,
            data: json!({ "id": id, "title": title, "updated_at": updated_at }),
            created_at: None,
            retry_count: 0,
        }],
        client_timestamp: Utc::now(),
    };

    let accepted = first
        .transport()
        .send_batch(&write("From laptop", newer))
        .await
        .unwrap();
    assert!(!accepted.processed_items[0].conflict);

    let rejected = second
        .transport()
        .send_batch(&write("From phone", older))
        .await
        .unwrap();
    let verdict = &rejected.processed_items[0];
    assert!(verdict.conflict);
    let resolved = verdict.resolved_data.as_ref().unwrap();
    assert_eq!(resolved.title, "From laptop");
    assert_eq!(resolved.updated_at, newer);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let base_url = spawn_server(2).await;
    let sync = client(&base_url).await;
    for i in 0..3 {
        sync.local().create_task(NewTask::new(format!("Task {}", i))).await.unwrap();
    }

    let direct = BatchRequest::from_entries(&sync.local().list_queue().await.unwrap()).unwrap();
    let err = sync.transport().send_batch(&direct).await.unwrap_err();
    match err {
        TaskSyncError::Transport(message) => assert!(message.contains("400")),
        other => panic!("unexpected error: {other}"),
    }

    let result = sync.reconcile().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.failed_items, 3);
}
