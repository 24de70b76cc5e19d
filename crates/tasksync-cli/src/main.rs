use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

/// tasksync - offline-first task manager
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task title
        #[arg(required = true)]
        title: Vec<String>,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List tasks
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },

    /// Show detailed view of a task
    Show {
        /// Task ID (or prefix)
        id: String,
    },

    /// Edit a task
    Edit {
        /// Task ID (or prefix)
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description
        #[arg(long)]
        clear_description: bool,
    },

    /// Mark a task as done
    Done {
        /// Task ID (or prefix)
        id: String,
    },

    /// Mark a task as not done
    Undone {
        /// Task ID (or prefix)
        id: String,
    },

    /// Delete a task
    Delete {
        /// Task ID (or prefix)
        id: String,
    },

    /// Push queued changes to the sync server
    Sync {
        /// Skip the connectivity probe
        #[arg(long)]
        force: bool,
    },

    /// Show sync status
    Status,

    /// List queued sync operations
    Queue,

    /// Show or initialize configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Add { title, description } => {
            commands::add(title, description).await?;
        }
        Commands::List { all } => {
            commands::list(all).await?;
        }
        Commands::Show { id } => {
            commands::show(&id).await?;
        }
        Commands::Edit {
            id,
            title,
            description,
            clear_description,
        } => {
            commands::edit(&id, title, description, clear_description).await?;
        }
        Commands::Done { id } => {
            commands::done::run(&id, true).await?;
        }
        Commands::Undone { id } => {
            commands::done::run(&id, false).await?;
        }
        Commands::Delete { id } => {
            commands::delete(&id).await?;
        }
        Commands::Sync { force } => {
            commands::sync(force).await?;
        }
        Commands::Status => {
            commands::status().await?;
        }
        Commands::Queue => {
            commands::queue().await?;
        }
        Commands::Config { init } => {
            commands::config(init).await?;
        }
    }

    Ok(())
}
