// proxy-server/src/auth/inspector.rs
use common::{TokenError, TokenSigner};
use std::sync::Arc;

use super::{Credential, CredentialOrigin};

const BEARER_PREFIX: &str = "bearer ";

/// Why a request ended up without a usable identity
#[derive(Debug, thiserror::Error)]
pub enum InspectFailure {
    #[error("no bearer token presented")]
    Absent,

    #[error("authorization header carries an empty token")]
    Empty,

    #[error(transparent)]
    Invalid(#[from] TokenError),
}

impl InspectFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            InspectFailure::Absent => "absent",
            InspectFailure::Empty => "malformed",
            InspectFailure::Invalid(e) => e.reason(),
        }
    }
}

/// Decodes the caller's bearer token, if any
pub struct TokenInspector {
    signer: Arc<TokenSigner>,
}

impl TokenInspector {
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self { signer }
    }

    /// Usable credential or `None`; failures are logged, never returned
    pub fn inspect(&self, authorization: Option<&str>) -> Option<Credential> {
        match self.examine(authorization) {
            Ok(credential) => {
                tracing::debug!(
                    subject = %credential.claims.subject,
                    role = %credential.claims.role,
                    "Bearer token accepted"
                );
                Some(credential)
            }
            Err(InspectFailure::Absent) => {
                tracing::debug!(reason = "absent", "No bearer token on request");
                None
            }
            Err(e) => {
                tracing::warn!(reason = e.reason(), error = %e, "Ignoring unusable bearer token");
                None
            }
        }
    }

    /// Like `inspect`, but keeps the failure reason
    pub fn examine(&self, authorization: Option<&str>) -> Result<Credential, InspectFailure> {
        let header = authorization.ok_or(InspectFailure::Absent)?;
        let token = extract_token(header);
        if token.is_empty() {
            return Err(InspectFailure::Empty);
        }

        let claims = self.signer.verify(token)?;
        Ok(Credential {
            token: token.to_string(),
            claims,
            origin: CredentialOrigin::Presented,
        })
    }
}

/// Strip a leading `Bearer ` marker; a bare token is taken as-is
fn extract_token(header: &str) -> &str {
    let header = header.trim_start();
    match header.get(..BEARER_PREFIX.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => header[BEARER_PREFIX.len()..].trim(),
        _ => header.trim_end(),
    }
}
