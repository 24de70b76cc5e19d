use anyhow::{Context, Result};
use tasksync_core::{Config, TaskUpdate};

use super::common::{open_db, resolve_task, short_id};

pub async fn run(
    id: &str,
    title: Option<String>,
    description: Option<String>,
    clear_description: bool,
) -> Result<()> {
    let description = if clear_description {
        Some(None)
    } else {
        description.map(Some)
    };

    if title.is_none() && description.is_none() {
        anyhow::bail!("Nothing to change. Pass --title, --description or --clear-description.");
    }

    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;
    let task = resolve_task(&db, id).await?;

    let task = db
        .update_task(
            task.id,
            TaskUpdate {
                title,
                description,
                completed: None,
            },
        )
        .await?;

    println!("\u{2713} Updated: {}", task.title);
    println!("  ID: {}", short_id(&task));

    Ok(())
}
