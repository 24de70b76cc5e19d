use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored data: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(
        "Network error: {0}\n\nThe sync server could not be reached. Your changes are saved locally and will sync when you reconnect."
    )]
    Transport(String),

    #[error("Failed to resolve item {client_id}: {message}")]
    ItemResolution { client_id: String, message: String },
}

impl TaskSyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn item(client_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ItemResolution {
            client_id: client_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskSyncError>;
