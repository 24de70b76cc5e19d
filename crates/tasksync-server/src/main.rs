use std::sync::Arc;

use tasksync_core::{AuthorityConfig, RemoteAuthority, ServerStore};
use tasksync_server::{app_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; deployments set the environment directly.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tasksync_server=info".parse()?)
                .add_directive("tasksync_core=info".parse()?),
        )
        .init();

    let config = Arc::new(ServerConfig::from_env()?);
    tracing::info!("Starting tasksync-server with config: {:?}", config);

    let store = ServerStore::new(&config.db_path).await?;
    store.run_migrations().await?;
    let authority = RemoteAuthority::new(
        store,
        AuthorityConfig {
            max_batch_items: config.max_batch_items,
        },
    );

    let state = AppState::new(config.clone(), authority);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("tasksync-server listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
