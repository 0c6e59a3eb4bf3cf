// proxy-server/src/state.rs
use common::{Config, TokenSigner};
use std::sync::Arc;

use crate::auth::{CredentialSynthesizer, TokenInspector};
use crate::error::StartupError;
use crate::forwarder::UpstreamForwarder;
use crate::health::HealthFallback;
use crate::normalize::PathNormalizer;
use crate::static_files::SpaConfig;

/// Everything a request handler needs; built once at startup and never mutated
pub struct ProxyState {
    pub normalizer: PathNormalizer,
    pub inspector: TokenInspector,
    pub synthesizer: CredentialSynthesizer,
    pub forwarder: UpstreamForwarder,
    pub fallback: HealthFallback,
    proxy_prefixes: Vec<String>,
    spa: SpaConfig,
}

impl ProxyState {
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        config.validate()?;

        let signer = Arc::new(TokenSigner::from_config(&config.auth));
        let proxy_prefixes = clean_prefixes(&config.routing.proxy_prefixes);

        Ok(Self {
            normalizer: PathNormalizer::new(&config.routing),
            inspector: TokenInspector::new(signer.clone()),
            synthesizer: CredentialSynthesizer::new(signer, &config.synthesis),
            forwarder: UpstreamForwarder::new(&config.upstream)?,
            fallback: HealthFallback::new(&config.upstream, &config.health)?,
            spa: SpaConfig::new(&config.static_files, proxy_prefixes.clone()),
            proxy_prefixes,
        })
    }

    pub fn proxy_prefixes(&self) -> &[String] {
        &self.proxy_prefixes
    }

    pub fn spa(&self) -> &SpaConfig {
        &self.spa
    }
}

// "/api/" and "api" both mean "/api"; a bare "/" would swallow the SPA
fn clean_prefixes(prefixes: &[String]) -> Vec<String> {
    let mut cleaned = Vec::with_capacity(prefixes.len());

    for prefix in prefixes {
        let trimmed = prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            tracing::warn!(prefix = %prefix, "Ignoring empty proxy prefix");
            continue;
        }
        let prefix = format!("/{}", trimmed);
        if !cleaned.contains(&prefix) {
            cleaned.push(prefix);
        }
    }

    cleaned
}
