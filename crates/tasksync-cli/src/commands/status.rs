use anyhow::{Context, Result};
use chrono::Local;
use tasksync_core::{Config, SyncService};

pub async fn run() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let service = SyncService::from_config(&config)
        .await
        .context("Failed to initialize sync service")?;

    let status = service.status().await?;

    println!("Server:        {}", config.sync.resolved_server_url());
    println!(
        "Connection:    {}",
        if status.is_online { "online" } else { "offline" }
    );
    println!("Queued:        {}", status.sync_queue_size);
    if status.exhausted_entries > 0 {
        println!(
            "Stuck:         {} (reached {} retries)",
            status.exhausted_entries, config.sync.max_retries
        );
    }
    match status.last_sync_timestamp {
        Some(ts) => println!(
            "Last sync:     {}",
            ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Last sync:     never"),
    }

    Ok(())
}
