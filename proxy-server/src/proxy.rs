// proxy-server/src/proxy.rs
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use common::Role;

use crate::error::ProxyError;
use crate::forwarder::{has_body, stream_body, RequestContext};
use crate::state::ProxyState;

// Configure proxy routes: every proxy-eligible prefix goes upstream
pub fn configure(cfg: &mut web::ServiceConfig, prefixes: &[String]) {
    for prefix in prefixes {
        cfg.service(web::scope(prefix).default_service(web::to(forward_request)));
    }
}

/// Inspect or synthesize credentials, normalize the path, forward, and fall back on failure
pub async fn forward_request(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    let original_path = req.path().to_string();

    // A header that is not valid text still counts as presented
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());

    let mut credential = state.inspector.inspect(authorization);
    if credential.is_none() && state.synthesizer.permits(&original_path) {
        match state.synthesizer.synthesize(&original_path) {
            Ok(synthesized) => credential = Some(synthesized),
            Err(e) => tracing::error!(path = %original_path, error = %e, "Failed to synthesize token"),
        }
    }

    let role = credential.as_ref().map_or(Role::Standard, |c| c.role());
    let normalized = state.normalizer.normalize_traced(&original_path, role);
    tracing::debug!(
        path = %original_path,
        normalized = %normalized.path,
        rule = normalized.rule,
        role = %role,
        "Normalized request path"
    );

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| ProxyError::BadGateway(e.to_string()))?;

    let body = if has_body(req.headers()) {
        Some(stream_body(payload))
    } else {
        None
    };

    let ctx = RequestContext {
        method,
        original_path,
        normalized_path: normalized.path.clone(),
        query: Some(req.query_string().to_string()).filter(|q| !q.is_empty()),
        headers: req.headers().clone(),
        body,
        credential,
    };

    match state.forwarder.forward(ctx).await {
        Ok(response) => {
            let status = response.status();
            if status >= 400 {
                tracing::debug!(path = %normalized.path, status, "Passing upstream error through");
            }
            Ok(response.into_http_response())
        }
        Err(failure) => Err(state.fallback.recover(&failure, &normalized.path).await),
    }
}
