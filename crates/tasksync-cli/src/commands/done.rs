use anyhow::{Context, Result};
use tasksync_core::{Config, TaskUpdate};

use super::common::{open_db, resolve_task, short_id};

/// Set the completion flag of a task. `completed = false` reopens it.
pub async fn run(id: &str, completed: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;
    let task = resolve_task(&db, id).await?;

    if task.completed == completed {
        let state = if completed { "complete" } else { "open" };
        println!("Task '{}' is already {}.", task.title, state);
        return Ok(());
    }

    let task = db
        .update_task(
            task.id,
            TaskUpdate {
                completed: Some(completed),
                ..Default::default()
            },
        )
        .await?;

    if completed {
        println!("\u{2713} Completed: {}", task.title);
    } else {
        println!("\u{21ba} Reopened: {}", task.title);
    }
    println!("  ID: {}", short_id(&task));

    Ok(())
}
