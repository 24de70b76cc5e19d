//! Application configuration module
//!
//! Provides configuration management with TOML file support,
//! environment variable integration, and sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Reconciliation settings, handed to the sync service at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_server_url_env")]
    pub server_url_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_local_db_name")]
    pub local_db_name: String,
}

// Default value functions for serde
fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_server_url_env() -> String {
    "TASKSYNC_SERVER_URL".to_string()
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_interval_secs() -> u64 {
    30
}

fn default_local_db_name() -> String {
    "tasks.db".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            server_url_env: default_server_url_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            local_db_name: default_local_db_name(),
        }
    }
}

impl SyncConfig {
    /// Server base address, with the environment override applied and any
    /// trailing slash removed.
    pub fn resolved_server_url(&self) -> String {
        let url = env::var(&self.server_url_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.server_url.clone());
        url.trim_end_matches('/').to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// Returns the configuration directory path (~/.config/tasksync/)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tasksync");
        Ok(config_dir)
    }

    /// Returns the configuration file path (~/.config/tasksync/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the local database path (~/.config/tasksync/tasks.db)
    ///
    /// # Errors
    ///
    /// Returns an error if the database name contains path traversal sequences.
    pub fn local_db_path(&self) -> Result<PathBuf> {
        let db_name = &self.database.local_db_name;

        if db_name.contains("..") || db_name.contains('/') || db_name.contains('\\') {
            anyhow::bail!(
                "Invalid database name '{}': must be a simple filename without path separators",
                db_name
            );
        }

        Ok(Self::config_dir()?.join(db_name))
    }

    /// Load configuration from file, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Reject values the sync service cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            anyhow::bail!("sync.batch_size must be at least 1");
        }
        if self.sync.max_retries == 0 {
            anyhow::bail!("sync.max_retries must be at least 1");
        }
        let url = &self.sync.server_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("sync.server_url must start with http:// or https://");
        }
        Ok(())
    }

    /// Save configuration to file, creating the directory if needed.
    ///
    /// On Unix systems, the config file is created with mode 0600 (owner read/write only).
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        let config_path = Self::config_path()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

            #[cfg(unix)]
            {
                let dir_perms = std::fs::Permissions::from_mode(0o700);
                fs::set_permissions(&config_dir, dir_perms)
                    .with_context(|| format!("Failed to set permissions on config directory: {}", config_dir.display()))?;
            }
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;

        fs::write(&config_path, &content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        #[cfg(unix)]
        {
            let file_perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&config_path, file_perms)
                .with_context(|| format!("Failed to set permissions on config file: {}", config_path.display()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.sync.server_url, "http://127.0.0.1:3000");
        assert_eq!(config.sync.server_url_env, "TASKSYNC_SERVER_URL");
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.request_timeout_secs, 5);
        assert_eq!(config.sync.probe_timeout_secs, 2);
        assert_eq!(config.sync.interval_secs, 30);

        assert_eq!(config.database.local_db_name, "tasks.db");
    }

    #[test]
    fn test_config_load_from_toml() {
        let toml_content = r#"
[sync]
server_url = "https://sync.example.com"
server_url_env = "CUSTOM_SYNC_URL"
batch_size = 10
max_retries = 5
request_timeout_secs = 3
probe_timeout_secs = 1
interval_secs = 120

[database]
local_db_name = "my_tasks.db"
"#;

        let config: Config = toml::from_str(toml_content).expect("Failed to parse TOML");

        assert_eq!(config.sync.server_url, "https://sync.example.com");
        assert_eq!(config.sync.server_url_env, "CUSTOM_SYNC_URL");
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.sync.probe_timeout(), Duration::from_secs(1));
        assert_eq!(config.sync.interval(), Duration::from_secs(120));
        assert_eq!(config.database.local_db_name, "my_tasks.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_toml() {
        let toml_content = r#"
[sync]
batch_size = 25
"#;

        let config: Config = toml::from_str(toml_content).expect("Failed to parse TOML");

        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.server_url, "http://127.0.0.1:3000");
        assert_eq!(config.database.local_db_name, "tasks.db");
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = Config::default();
        config.sync.server_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let mut config = Config::default();
        config.sync.request_timeout_secs = 0;
        config.sync.probe_timeout_secs = 0;
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.sync.probe_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path().expect("Failed to get config path");
        assert!(config_path.ends_with("config.toml"));
    }

    #[test]
    fn test_local_db_path() {
        let config = Config::default();
        let db_path = config.local_db_path().expect("Failed to get local db path");
        assert!(db_path.ends_with("tasks.db"));
    }

    #[test]
    fn test_local_db_path_rejects_path_traversal() {
        let mut config = Config::default();
        config.database.local_db_name = "../../../etc/passwd".to_string();
        assert!(config.local_db_path().is_err(), "Should reject path traversal");

        config.database.local_db_name = "..\\..\\windows\\system32".to_string();
        assert!(config.local_db_path().is_err(), "Should reject Windows path traversal");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize");

        let parsed: Config = toml::from_str(&toml_str).expect("Failed to parse");
        assert_eq!(parsed.sync, config.sync);
        assert_eq!(parsed.database.local_db_name, config.database.local_db_name);
    }

    #[test]
    fn test_server_url_env_override() {
        let mut config = Config::default();
        config.sync.server_url_env = "TASKSYNC_TEST_SERVER_URL".to_string();

        temp_env::with_var("TASKSYNC_TEST_SERVER_URL", Some("https://remote.example.com/"), || {
            assert_eq!(config.sync.resolved_server_url(), "https://remote.example.com");
        });
    }

    #[test]
    fn test_server_url_falls_back_when_env_missing() {
        let mut config = Config::default();
        config.sync.server_url_env = "TASKSYNC_TEST_MISSING_URL_12345".to_string();

        temp_env::with_var_unset("TASKSYNC_TEST_MISSING_URL_12345", || {
            assert_eq!(config.sync.resolved_server_url(), "http://127.0.0.1:3000");
        });
    }
}
