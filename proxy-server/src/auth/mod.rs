// proxy-server/src/auth/mod.rs
pub mod inspector;
pub mod synthesizer;

pub use inspector::{InspectFailure, TokenInspector};
pub use synthesizer::CredentialSynthesizer;

use common::{Role, SignedToken, TokenClaims};

/// Where the bearer token attached to an outbound request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    Presented,
    Synthesized,
}

/// A usable bearer token and the identity it carries
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub claims: TokenClaims,
    pub origin: CredentialOrigin,
}

impl Credential {
    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub(crate) fn synthesized(signed: SignedToken) -> Self {
        Self {
            token: signed.token,
            claims: signed.claims,
            origin: CredentialOrigin::Synthesized,
        }
    }
}
