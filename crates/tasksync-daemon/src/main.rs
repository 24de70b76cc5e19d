use anyhow::Result;
use tasksync_core::{Config, SyncResult, SyncService, SyncTransport};
use tokio::time::{interval, MissedTickBehavior};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tasksync_daemon=info".parse()?)
                .add_directive("tasksync_core=info".parse()?),
        )
        .init();

    let config = Config::load()?;
    let service = SyncService::from_config(&config).await?;

    tracing::info!(
        server = %config.sync.resolved_server_url(),
        interval_secs = config.sync.interval().as_secs(),
        "tasksync-daemon running"
    );

    let mut ticker = interval(config.sync.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync_once(&service).await {
                    tracing::error!(error = %e, "sync tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}

/// Probe the server and reconcile when it answers. `None` means the server
/// was unreachable and nothing was attempted.
async fn sync_once<T: SyncTransport>(service: &SyncService<T>) -> Result<Option<SyncResult>> {
    if !service.check_connectivity().await {
        tracing::debug!("sync server unreachable, skipping tick");
        return Ok(None);
    }

    let result = service.reconcile().await?;
    if result.synced_items > 0 || result.failed_items > 0 {
        tracing::info!(
            synced = result.synced_items,
            failed = result.failed_items,
            conflicts = result.conflicts.len(),
            "sync tick finished"
        );
    }
    Ok(Some(result))
}
