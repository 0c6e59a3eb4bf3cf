// proxy-server/src/forwarder.rs
//! Sends the normalized, authenticated request to the upstream API and
//! streams the answer back without touching it.

use actix_web::body::SizedStream;
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use bytes::Bytes;
use common::UpstreamConfig;
use futures_util::StreamExt;
use reqwest::header as outbound;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::Credential;
use crate::error::StartupError;

// Chunks buffered between the inbound payload and the outbound request
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Per-request data handed to the forwarder
pub struct RequestContext {
    pub method: reqwest::Method,
    pub original_path: String,
    pub normalized_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<reqwest::Body>,
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConnectionRefused,
    Timeout,
    Other,
}

/// The upstream could not be reached or did not answer
#[derive(Debug, thiserror::Error)]
#[error("upstream request failed ({kind:?}): {message}")]
pub struct UpstreamFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl UpstreamFailure {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FailureKind::Timeout
        } else if e.is_connect() {
            FailureKind::ConnectionRefused
        } else {
            FailureKind::Other
        };

        Self { kind, message: e.to_string() }
    }
}

/// Upstream answer, whatever its status
pub struct UpstreamResponse {
    inner: reqwest::Response,
    bodyless: bool,
}

pub type UpstreamResult = Result<UpstreamResponse, UpstreamFailure>;

impl UpstreamResponse {
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Copy status and end-to-end headers, stream the body as received
    pub fn into_http_response(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);

        for (name, value) in self.inner.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                (Ok(name), Ok(value)) => {
                    builder.append_header((name, value));
                }
                _ => tracing::debug!(header = %name, "Dropping unrepresentable upstream header"),
            }
        }

        if self.bodyless {
            return builder.finish();
        }

        match self.inner.content_length() {
            Some(len) => builder.body(SizedStream::new(len, self.inner.bytes_stream())),
            None => builder.streaming(self.inner.bytes_stream()),
        }
    }
}

/// HTTP client bound to the single upstream API
pub struct UpstreamForwarder {
    client: reqwest::Client,
    base_url: String,
    host_header: outbound::HeaderValue,
    request_timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(upstream.connect_timeout_ms))
            .pool_max_idle_per_host(100)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let host_header = outbound::HeaderValue::from_str(&upstream.authority())
            .map_err(|_| StartupError::InvalidUpstream(upstream.authority()))?;

        Ok(Self {
            client,
            base_url: upstream.base_url(),
            host_header,
            request_timeout: Duration::from_secs(upstream.request_timeout_secs),
        })
    }

    pub fn upstream_url(&self, ctx: &RequestContext) -> String {
        match ctx.query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, ctx.normalized_path, q),
            _ => format!("{}{}", self.base_url, ctx.normalized_path),
        }
    }

    /// Issue the request; no retries happen here
    pub async fn forward(&self, ctx: RequestContext) -> UpstreamResult {
        let url = self.upstream_url(&ctx);
        let headers = outbound_headers(&ctx.headers, &self.host_header, ctx.credential.as_ref());
        let bodyless = ctx.method == reqwest::Method::HEAD;

        let mut builder = self.client.request(ctx.method, &url).headers(headers);
        if let Some(body) = ctx.body {
            builder = builder.body(body);
        }

        tracing::debug!(upstream = %url, original = %ctx.original_path, "Forwarding request");

        // Only the wait for response headers is bounded; streamed bodies may take longer
        match tokio::time::timeout(self.request_timeout, builder.send()).await {
            Ok(Ok(response)) => {
                let bodyless = bodyless
                    || response.status() == reqwest::StatusCode::NO_CONTENT
                    || response.status() == reqwest::StatusCode::NOT_MODIFIED;
                Ok(UpstreamResponse { inner: response, bodyless })
            }
            Ok(Err(e)) => Err(UpstreamFailure::from_reqwest(&e)),
            Err(_) => Err(UpstreamFailure {
                kind: FailureKind::Timeout,
                message: format!("no response within {}s", self.request_timeout.as_secs()),
            }),
        }
    }
}

/// Inbound headers minus Host and hop-by-hop ones, with Host and Authorization set for the upstream
pub fn outbound_headers(
    inbound: &HeaderMap,
    host: &outbound::HeaderValue,
    credential: Option<&Credential>,
) -> outbound::HeaderMap {
    let mut headers = outbound::HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound.iter() {
        if *name == actix_web::http::header::HOST || is_hop_by_hop(name.as_str()) {
            continue;
        }
        match (
            outbound::HeaderName::from_bytes(name.as_str().as_bytes()),
            outbound::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping unrepresentable inbound header"),
        }
    }

    headers.insert(outbound::HOST, host.clone());

    if let Some(credential) = credential {
        match outbound::HeaderValue::from_str(&credential.authorization_value()) {
            Ok(value) => {
                headers.insert(outbound::AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Bearer token is not a valid header value, leaving Authorization as sent"),
        }
    }

    headers
}

/// Whether the inbound request declares a body worth streaming
pub fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(actix_web::http::header::TRANSFER_ENCODING) {
        return true;
    }

    headers
        .get(actix_web::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(false, |len| len > 0)
}

/// Pump the inbound payload into a body reqwest can send from any thread
pub fn stream_body(mut payload: web::Payload) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(BODY_CHANNEL_CAPACITY);

    actix_web::rt::spawn(async move {
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()));
            let failed = chunk.is_err();
            // Receiver gone means the upstream request was dropped
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialOrigin;
    use actix_web::http::header;
    use common::{Role, TokenClaims};

    fn credential(token: &str) -> Credential {
        Credential {
            token: token.to_string(),
            claims: TokenClaims {
                subject: "user@localhost".to_string(),
                role: Role::Standard,
                issued_at: 0,
                expires_at: 86400,
            },
            origin: CredentialOrigin::Synthesized,
        }
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("frontend.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));
        headers
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Upgrade"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("Content-Type"));
    }

    #[test]
    fn test_outbound_headers_rewrite_host() {
        let host = outbound::HeaderValue::from_static("api:3000");
        let headers = outbound_headers(&inbound(), &host, None);

        assert_eq!(headers.get(outbound::HOST).unwrap(), "api:3000");
        assert_eq!(headers.get(outbound::ACCEPT).unwrap(), "application/json");
        assert!(headers.get(outbound::CONNECTION).is_none());
        assert_eq!(headers.get_all(outbound::COOKIE).iter().count(), 2);
        assert!(headers.get(outbound::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_outbound_headers_overwrite_authorization() {
        let mut inbound = inbound();
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        let host = outbound::HeaderValue::from_static("api:3000");

        let untouched = outbound_headers(&inbound, &host, None);
        assert_eq!(untouched.get(outbound::AUTHORIZATION).unwrap(), "Bearer stale");

        let cred = credential("fresh.jwt.token");
        let rewritten = outbound_headers(&inbound, &host, Some(&cred));
        assert_eq!(
            rewritten.get(outbound::AUTHORIZATION).unwrap(),
            "Bearer fresh.jwt.token"
        );
        assert_eq!(rewritten.get_all(outbound::AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_has_body() {
        let mut headers = HeaderMap::new();
        assert!(!has_body(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_body(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(has_body(&headers));

        let mut chunked = HeaderMap::new();
        chunked.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(has_body(&chunked));
    }

    #[test]
    fn test_upstream_url_keeps_query() {
        let forwarder = UpstreamForwarder::new(&UpstreamConfig::default()).unwrap();
        let mut ctx = RequestContext {
            method: reqwest::Method::GET,
            original_path: "/api/api/probes".to_string(),
            normalized_path: "/probes".to_string(),
            query: Some("page=2&size=10".to_string()),
            headers: HeaderMap::new(),
            body: None,
            credential: None,
        };
        assert_eq!(forwarder.upstream_url(&ctx), "http://127.0.0.1:3000/probes?page=2&size=10");

        ctx.query = Some(String::new());
        assert_eq!(forwarder.upstream_url(&ctx), "http://127.0.0.1:3000/probes");
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let upstream = UpstreamConfig { port, ..UpstreamConfig::default() };
        let forwarder = UpstreamForwarder::new(&upstream).unwrap();

        let ctx = RequestContext {
            method: reqwest::Method::GET,
            original_path: "/users/me".to_string(),
            normalized_path: "/users/me".to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: None,
            credential: None,
        };

        let failure = forwarder.forward(ctx).await.err().unwrap();
        assert_eq!(failure.kind, FailureKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        // Accepts connections and never writes a byte back
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let upstream = UpstreamConfig { port, request_timeout_secs: 1, ..UpstreamConfig::default() };
        let forwarder = UpstreamForwarder::new(&upstream).unwrap();
        let health = common::HealthConfig { timeout_ms: 300, ..common::HealthConfig::default() };
        let fallback = crate::health::HealthFallback::new(&upstream, &health).unwrap();

        let ctx = RequestContext {
            method: reqwest::Method::GET,
            original_path: "/api/probes".to_string(),
            normalized_path: "/probes".to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: None,
            credential: None,
        };

        let started = std::time::Instant::now();
        let failure = forwarder.forward(ctx).await.err().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));

        // The health endpoint hangs as well, so the fallback reports the upstream down
        let err = fallback.recover(&failure, "/probes").await;
        assert!(matches!(err, crate::error::ProxyError::UpstreamDown { retry_after: 30, .. }));
    }
}
