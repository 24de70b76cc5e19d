//! Detailed view of a single task.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tasksync_core::{Config, Task};

use super::common::{open_db, resolve_task};

pub async fn run(id: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;

    let task = resolve_task(&db, id).await?;
    let queued = db.count_queue_for_task(task.id).await?;
    print_detailed_task(&task, queued);

    Ok(())
}

fn print_detailed_task(task: &Task, queued: u64) {
    let status = if task.completed {
        "\x1b[32mCompleted\x1b[0m"
    } else {
        "\x1b[33mOpen\x1b[0m"
    };

    println!("\x1b[1m{}\x1b[0m", task.title);
    println!("  ID:         {}", task.id);
    println!("  Status:     {}", status);
    if let Some(desc) = &task.description {
        println!("  Description:");
        for line in desc.lines() {
            println!("    {}", line);
        }
    }
    println!("  Created:    {}", local_time(task.created_at));
    println!("  Updated:    {}", local_time(task.updated_at));
    println!("  Sync:       {} ({} queued)", task.sync_status, queued);
    if let Some(server_id) = &task.server_id {
        println!("  Server ID:  {}", server_id);
    }
    if let Some(synced) = task.last_synced_at {
        println!("  Last sync:  {}", local_time(synced));
    }
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
