use anyhow::{Context, Result};
use tasksync_core::{Config, NewTask};

use super::common::{open_db, short_id};

pub async fn run(title: Vec<String>, description: Option<String>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = open_db(&config).await?;

    let mut input = NewTask::new(title.join(" "));
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        input = input.with_description(description);
    }

    let task = db.create_task(input).await?;

    println!("\u{2713} Added: {}", task.title);
    println!("  ID: {}", short_id(&task));

    Ok(())
}
