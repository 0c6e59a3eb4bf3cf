// proxy-server/src/auth/synthesizer.rs
use common::{unix_now, Role, SynthesisConfig, TokenError, TokenSigner};
use std::sync::Arc;

use super::Credential;
use crate::normalize::{is_admin_path, is_login_path, is_registration_path};

/// Mints placeholder credentials for requests that arrive without one.
///
/// This is a convenience for diagnostic tooling, not an access control
/// mechanism: when enabled, anonymous callers reach role-gated upstream
/// routes. It is off unless `synthesis.enabled` is set.
pub struct CredentialSynthesizer {
    signer: Arc<TokenSigner>,
    enabled: bool,
    allow_paths: Vec<String>,
    admin_subject: String,
    standard_subject: String,
}

impl CredentialSynthesizer {
    pub fn new(signer: Arc<TokenSigner>, policy: &SynthesisConfig) -> Self {
        Self {
            signer,
            enabled: policy.enabled,
            allow_paths: policy.allow_paths.clone(),
            admin_subject: policy.admin_subject.clone(),
            standard_subject: policy.standard_subject.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a token may be synthesized for this inbound path
    pub fn permits(&self, path: &str) -> bool {
        if !self.enabled || is_login_path(path) || is_registration_path(path) {
            return false;
        }

        self.allow_paths.is_empty()
            || self.allow_paths.iter().any(|prefix| path_has_prefix(path, prefix))
    }

    /// Role the synthesized identity gets for `target_path`
    pub fn role_for(&self, target_path: &str) -> Role {
        if is_admin_path(target_path) {
            Role::Admin
        } else {
            Role::Standard
        }
    }

    pub fn synthesize(&self, target_path: &str) -> Result<Credential, TokenError> {
        self.synthesize_at(target_path, unix_now())
    }

    pub fn synthesize_at(&self, target_path: &str, issued_at: i64) -> Result<Credential, TokenError> {
        let subject = match self.role_for(target_path) {
            Role::Admin => &self.admin_subject,
            Role::Standard => &self.standard_subject,
        };

        let signed = self.signer.issue_at(subject, issued_at)?;
        tracing::info!(
            path = %target_path,
            subject = %signed.claims.subject,
            role = %signed.claims.role,
            "Synthesized bearer token for anonymous request"
        );

        Ok(Credential::synthesized(signed))
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path.strip_prefix(prefix).map_or(false, |rest| rest.starts_with('/'))
}
