// proxy-server/src/health.rs
//! Turns a failed forward into a retryable 503 after one liveness probe

use common::{HealthConfig, UpstreamConfig};
use std::time::Duration;

use crate::error::{ProxyError, StartupError};
use crate::forwarder::UpstreamFailure;
use crate::normalize::is_auth_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Alive,
    Down,
}

/// Probes the upstream health endpoint after a connection-level failure.
/// Nothing is cached: every failed forward issues its own probe.
pub struct HealthFallback {
    client: reqwest::Client,
    url: String,
    auth_retry_after: u64,
    endpoint_retry_after: u64,
    down_retry_after: u64,
}

impl HealthFallback {
    pub fn new(upstream: &UpstreamConfig, health: &HealthConfig) -> Result<Self, StartupError> {
        let timeout = Duration::from_millis(health.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            url: format!("{}{}", upstream.base_url(), health.path),
            auth_retry_after: health.auth_retry_after,
            endpoint_retry_after: health.endpoint_retry_after,
            down_retry_after: health.down_retry_after,
        })
    }

    pub fn probe_url(&self) -> &str {
        &self.url
    }

    pub async fn probe(&self) -> HealthStatus {
        tracing::debug!(url = %self.url, "Health probe issued");

        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => HealthStatus::Alive,
            Ok(resp) => {
                tracing::debug!(status = resp.status().as_u16(), "Health probe returned non-success");
                HealthStatus::Down
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                HealthStatus::Down
            }
        }
    }

    /// Probe once and produce the single response the caller will get
    pub async fn recover(&self, failure: &UpstreamFailure, path: &str) -> ProxyError {
        let status = self.probe().await;

        match status {
            HealthStatus::Alive => tracing::warn!(
                path = %path,
                kind = ?failure.kind,
                error = %failure.message,
                "Upstream alive but request failed"
            ),
            HealthStatus::Down => tracing::error!(
                path = %path,
                kind = ?failure.kind,
                error = %failure.message,
                "Upstream unreachable"
            ),
        }

        self.verdict(status, path)
    }

    pub fn verdict(&self, status: HealthStatus, path: &str) -> ProxyError {
        match status {
            HealthStatus::Alive => ProxyError::EndpointUnavailable {
                path: path.to_string(),
                retry_after: if is_auth_path(path) {
                    self.auth_retry_after
                } else {
                    self.endpoint_retry_after
                },
            },
            HealthStatus::Down => ProxyError::UpstreamDown {
                path: path.to_string(),
                retry_after: self.down_retry_after,
            },
        }
    }
}
