use anyhow::{Context, Result};
use tasksync_core::Config;

use super::common::{open_db, resolve_task, short_id};

pub async fn run(id: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;
    let task = resolve_task(&db, id).await?;

    let task = db.delete_task(task.id).await?;
    tracing::debug!(task_id = %task.id, "queued delete");

    println!("\u{2717} Deleted: {}", task.title);
    println!("  ID: {}", short_id(&task));

    Ok(())
}
