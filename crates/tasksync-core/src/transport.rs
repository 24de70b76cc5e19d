//! Transports carrying batches from the reconciler to the remote authority.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use crate::config::SyncConfig;
use crate::error::{Result, TaskSyncError};
use crate::protocol::{BatchRequest, BatchResponse, BATCH_PATH, HEALTH_PATH};

/// Delivery channel to the remote authority.
///
/// `send_batch` either returns the full verdict list or fails as a whole with
/// `TaskSyncError::Transport`. `ping` is advisory and never fails.
pub trait SyncTransport: Send + Sync {
    fn send_batch(
        &self,
        request: &BatchRequest,
    ) -> impl Future<Output = Result<BatchResponse>> + Send;

    fn ping(&self) -> impl Future<Output = bool> + Send;
}

/// JSON-over-HTTP transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Self::with_base_url(config.resolved_server_url(), config)
    }

    pub fn with_base_url(base_url: impl Into<String>, config: &SyncConfig) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TaskSyncError::Config(format!(
                "server url must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| TaskSyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout(),
            probe_timeout: config.probe_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SyncTransport for HttpTransport {
    async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse> {
        let url = format!("{}{}", self.base_url, BATCH_PATH);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| TaskSyncError::transport(format!("Failed to send batch: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TaskSyncError::transport(format!(
                "Sync server error ({}): {}",
                status, body
            )));
        }

        response
            .json::<BatchResponse>()
            .await
            .map_err(|e| TaskSyncError::transport(format!("Failed to parse batch response: {}", e)))
    }

    async fn ping(&self) -> bool {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);

        match self.client.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }
}
