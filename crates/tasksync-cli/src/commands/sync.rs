use anyhow::{Context, Result};
use tasksync_core::{Config, SyncService};

pub async fn run(force: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let service = SyncService::from_config(&config)
        .await
        .context("Failed to initialize sync service")?;

    if !force && !service.check_connectivity().await {
        println!(
            "\u{2139}  Sync server at {} is not reachable.",
            config.sync.resolved_server_url()
        );
        println!("Your changes are saved locally. Run 'tasksync sync --force' to try anyway.");
        return Ok(());
    }

    println!("\u{1F504} Syncing...");

    let result = service.reconcile().await.context("Sync failed")?;

    if !result.success {
        println!("\u{2717} Sync failed; changes stay queued.");
        for error in &result.errors {
            println!("  {}", error.error);
        }
        return Ok(());
    }

    println!("\u{2713} Sync complete!");
    println!("  Synced: {} change(s)", result.synced_items);
    if result.failed_items > 0 {
        println!("  Failed: {} change(s)", result.failed_items);
        for error in &result.errors {
            let id = error
                .task_id
                .map(|id| id.to_string()[..8].to_string())
                .unwrap_or_default();
            println!("    {} {}", id, error.error);
        }
    }
    if !result.conflicts.is_empty() {
        println!(
            "  Conflicts: {} (resolved with last-write-wins)",
            result.conflicts.len()
        );
    }

    let remaining = service.local().queue_len().await?;
    if remaining > 0 {
        println!("  {} change(s) still queued; run sync again.", remaining);
    }

    Ok(())
}
