use anyhow::{Context, Result};
use chrono::Local;
use tasksync_core::Config;

use super::common::open_db;

pub async fn run() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;

    let entries = db.list_queue().await?;
    if entries.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<6} {} \"{}\" (retries: {})",
            entry.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            entry.operation.as_str(),
            &entry.task_id.to_string()[..8],
            entry.data.title,
            entry.retry_count
        );
        if let Some(error) = &entry.error_message {
            println!("    last error: {}", error);
        }
    }
    println!();
    println!("{} queued operation(s)", entries.len());

    Ok(())
}
