//! Helpers shared by the task commands.

use std::fs;

use anyhow::{Context, Result};
use tasksync_core::{Config, LocalDb, Task};

/// Open the configured local database, creating its directory on first use.
pub async fn open_db(config: &Config) -> Result<LocalDb> {
    let db_path = config.local_db_path()?;

    if let Some(parent) = db_path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let db = LocalDb::new(&db_path).await?;
    db.run_migrations().await?;
    Ok(db)
}

/// Resolve an ID prefix against active tasks.
///
/// Fails when nothing matches or when the prefix is ambiguous; the candidates
/// are printed to stderr in the latter case.
pub async fn resolve_task(db: &LocalDb, prefix: &str) -> Result<Task> {
    let prefix_lower = prefix.trim().to_lowercase();
    if prefix_lower.is_empty() {
        anyhow::bail!("Task ID must not be empty");
    }

    let mut matches = filter_by_prefix(db.list_active().await?, &prefix_lower);

    match matches.len() {
        0 => {
            eprintln!("No task found matching '{}'", prefix);
            eprintln!("The task may have been deleted, or the ID prefix is wrong.");
            eprintln!("Hint: Use 'tasksync list --all' to see the IDs of existing tasks.");
            anyhow::bail!("Task not found");
        }
        1 => Ok(matches.remove(0)),
        _ => {
            eprintln!("Multiple tasks match '{}'. Please be more specific:", prefix);
            eprintln!();
            for task in &matches {
                eprintln!("  {} {} [{}]", checkbox(task), task.title, short_id(task));
            }
            anyhow::bail!("Ambiguous ID - provide more characters");
        }
    }
}

fn filter_by_prefix(tasks: Vec<Task>, prefix_lower: &str) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|task| task.id.to_string().starts_with(prefix_lower))
        .collect()
}

pub fn short_id(task: &Task) -> String {
    task.id.to_string()[..8].to_string()
}

pub fn checkbox(task: &Task) -> &'static str {
    if task.completed { "[x]" } else { "[ ]" }
}
