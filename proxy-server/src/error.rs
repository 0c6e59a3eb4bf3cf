// proxy-server/src/error.rs
use actix_web::{http::header, http::StatusCode, HttpResponse, ResponseError};
use common::ConfigError;
use serde::Serialize;

/// Failures the proxy answers on its own instead of passing upstream output through
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Health probe succeeded; only the forwarded call failed
    #[error("upstream is running but could not serve {path}")]
    EndpointUnavailable { path: String, retry_after: u64 },

    /// Health probe failed as well
    #[error("upstream service is unreachable")]
    UpstreamDown { path: String, retry_after: u64 },

    #[error("could not build upstream request: {0}")]
    BadGateway(String),
}

/// JSON body sent with every proxy-generated failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ProxyError {
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::EndpointUnavailable { .. } => "upstream_endpoint_unavailable",
            ProxyError::UpstreamDown { .. } => "upstream_unavailable",
            ProxyError::BadGateway(_) => "bad_gateway",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProxyError::EndpointUnavailable { retry_after, .. }
            | ProxyError::UpstreamDown { retry_after, .. } => Some(*retry_after),
            ProxyError::BadGateway(_) => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (message, path) = match self {
            ProxyError::EndpointUnavailable { path, retry_after } => (
                format!("Service temporarily unavailable, retry after {} seconds", retry_after),
                Some(path.clone()),
            ),
            ProxyError::UpstreamDown { path, retry_after } => (
                format!("Service is fully unavailable, retry after {} seconds", retry_after),
                Some(path.clone()),
            ),
            ProxyError::BadGateway(_) => (self.to_string(), None),
        };

        ErrorBody {
            error: self.code().to_string(),
            message,
            retry_after: self.retry_after(),
            path,
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::EndpointUnavailable { .. } | ProxyError::UpstreamDown { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(retry_after) = self.retry_after() {
            builder.insert_header((header::RETRY_AFTER, retry_after.to_string()));
        }
        builder.json(self.body())
    }
}

/// Errors that stop the server from starting
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid upstream address: {0}")]
    InvalidUpstream(String),
}
