use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub max_batch_items: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TASKSYNC_BIND_ADDR", "127.0.0.1:3000");
        let db_path = PathBuf::from(value_or_default(&lookup, "TASKSYNC_SERVER_DB", "server.db"));

        let max_batch_items = value_or_default(&lookup, "TASKSYNC_MAX_BATCH_ITEMS", "500")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TASKSYNC_MAX_BATCH_ITEMS must be an integer in [1, 10000]".to_string(),
                )
            })?;
        if !(1..=10_000).contains(&max_batch_items) {
            return Err(ConfigError::Invalid(
                "TASKSYNC_MAX_BATCH_ITEMS must be in [1, 10000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path,
            max_batch_items,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
