use anyhow::{Context, Result};
use tasksync_core::{Config, SyncStatus};

use super::common::{checkbox, open_db, short_id};

pub async fn run(all: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;

    let tasks: Vec<_> = db
        .list_active()
        .await?
        .into_iter()
        .filter(|task| all || !task.completed)
        .collect();

    if tasks.is_empty() {
        if all {
            println!("No tasks yet. Add one with 'tasksync add <title>'.");
        } else {
            println!("Nothing to do. Use 'tasksync list --all' to include completed tasks.");
        }
        return Ok(());
    }

    for task in &tasks {
        let marker = match task.sync_status {
            SyncStatus::Synced => "",
            SyncStatus::Pending => " \u{2191}",
            SyncStatus::Error => " \u{26a0}",
        };
        println!("{} {} {}{}", short_id(task), checkbox(task), task.title, marker);
    }

    let unsynced = tasks
        .iter()
        .filter(|task| task.sync_status != SyncStatus::Synced)
        .count();
    if unsynced > 0 {
        println!();
        println!("{} task(s) waiting to sync", unsynced);
    }

    Ok(())
}
