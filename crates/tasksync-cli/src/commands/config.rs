use anyhow::{Context, Result};
use tasksync_core::Config;

pub async fn run(init: bool) -> Result<()> {
    let path = Config::config_path()?;

    if init {
        if path.exists() {
            println!("Configuration already exists at {}", path.display());
            return Ok(());
        }
        Config::default().save()?;
        println!("\u{2713} Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "defaults (no config file)".to_string()
    };

    println!("Config:        {}", source);
    println!("Database:      {}", config.local_db_path()?.display());
    println!("Server:        {}", config.sync.resolved_server_url());
    println!("  override env {}", config.sync.server_url_env);
    println!("Batch size:    {}", config.sync.batch_size);
    println!("Max retries:   {}", config.sync.max_retries);
    println!(
        "Timeouts:      {}s request, {}s probe",
        config.sync.request_timeout().as_secs(),
        config.sync.probe_timeout().as_secs()
    );
    println!("Interval:      {}s", config.sync.interval().as_secs());

    Ok(())
}
