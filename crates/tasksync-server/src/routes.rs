use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tasksync_core::protocol::{BatchRequest, BatchResponse, HealthResponse, BATCH_PATH, HEALTH_PATH};
use tasksync_core::RemoteAuthority;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    authority: Arc<RemoteAuthority>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, authority: RemoteAuthority) -> Self {
        Self {
            config,
            authority: Arc::new(authority),
        }
    }

    pub fn authority(&self) -> &RemoteAuthority {
        &self.authority
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(BATCH_PATH, post(sync_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

async fn sync_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let response = state.authority.process_batch(&request).await?;
    let conflicts = response
        .processed_items
        .iter()
        .filter(|item| item.conflict)
        .count();
    tracing::info!(
        items = request.items.len(),
        conflicts,
        "processed sync batch"
    );
    Ok(Json(response))
}
