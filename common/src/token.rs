// common/src/token.rs
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::AuthConfig;
use crate::utils::unix_now;

/// Caller role as seen by the upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Standard,
}

impl Role {
    /// The role is decided by the subject alone
    pub fn from_subject(subject: &str, admin_marker: &str) -> Self {
        if !admin_marker.is_empty() && subject.contains(admin_marker) {
            Role::Admin
        } else {
            Role::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Standard => "standard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub sub: String,
    // Some issuers only carry the identity as an email claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Decoded identity carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub role: Role,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A freshly signed token together with its claims
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: TokenClaims,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token carries no subject")]
    MissingSubject,

    #[error("token rejected: {0}")]
    Other(jsonwebtoken::errors::Error),
}

impl TokenError {
    /// Short machine-friendly reason used in log fields
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "bad_signature",
            TokenError::Expired => "expired",
            TokenError::MissingSubject | TokenError::Other(_) => "invalid",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Other(e),
        }
    }
}

/// HS256 signer/verifier shared by real and synthesized tokens
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
    admin_marker: String,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl_secs: i64, admin_marker: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = ["exp"].iter().map(|s| s.to_string()).collect();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
            admin_marker: admin_marker.into(),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(auth.jwt_secret.as_bytes(), auth.token_ttl_secs, auth.admin_marker.clone())
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn role_of(&self, subject: &str) -> Role {
        Role::from_subject(subject, &self.admin_marker)
    }

    /// Sign a token for `subject` issued now
    pub fn issue(&self, subject: &str) -> Result<SignedToken, TokenError> {
        self.issue_at(subject, unix_now())
    }

    /// Sign a token for `subject` with a fixed issue time; same inputs give the same token
    pub fn issue_at(&self, subject: &str, issued_at: i64) -> Result<SignedToken, TokenError> {
        let claims = JwtClaims {
            sub: subject.to_string(),
            email: None,
            iat: issued_at,
            exp: issued_at + self.ttl_secs,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken {
            token,
            claims: TokenClaims {
                subject: claims.sub,
                role: self.role_of(subject),
                issued_at: claims.iat,
                expires_at: claims.exp,
            },
        })
    }

    /// Verify signature and expiry, then derive the claims record
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;
        let JwtClaims { sub, email, iat, exp } = data.claims;

        let subject = if sub.is_empty() { email.unwrap_or_default() } else { sub };
        if subject.is_empty() {
            return Err(TokenError::MissingSubject);
        }

        Ok(TokenClaims {
            role: self.role_of(&subject),
            subject,
            issued_at: iat,
            expires_at: exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"unit-test-secret", 86400, "admin")
    }

    #[test]
    fn test_role_from_subject() {
        assert_eq!(Role::from_subject("admin@example.com", "admin"), Role::Admin);
        assert_eq!(Role::from_subject("sysadmin", "admin"), Role::Admin);
        assert_eq!(Role::from_subject("user@example.com", "admin"), Role::Standard);
        assert_eq!(Role::from_subject("anything", ""), Role::Standard);
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = signer();
        let signed = signer.issue("user@example.com").unwrap();
        assert_eq!(signed.claims.expires_at - signed.claims.issued_at, 86400);

        let claims = signer.verify(&signed.token).unwrap();
        assert_eq!(claims.subject, "user@example.com");
        assert_eq!(claims.role, Role::Standard);
        assert_eq!(claims, signed.claims);
    }

    #[test]
    fn test_issue_is_deterministic_for_fixed_time() {
        let signer = signer();
        let now = Utc::now().timestamp();
        let a = signer.issue_at("admin@example.com", now).unwrap();
        let b = signer.issue_at("admin@example.com", now).unwrap();
        assert_eq!(a.token, b.token);
        assert_eq!(a.claims.role, Role::Admin);
    }

    #[test]
    fn test_expired_token() {
        let signer = signer();
        let two_days_ago = Utc::now().timestamp() - 2 * 86400;
        let signed = signer.issue_at("user@example.com", two_days_ago).unwrap();

        let err = signer.verify(&signed.token).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
        assert_eq!(err.reason(), "expired");
    }

    #[test]
    fn test_wrong_secret() {
        let signed = signer().issue("user@example.com").unwrap();
        let other = TokenSigner::new(b"another-secret", 86400, "admin");

        let err = other.verify(&signed.token).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
        assert_eq!(err.reason(), "bad_signature");
    }

    #[test]
    fn test_garbage_token() {
        let err = signer().verify("not-a-jwt").unwrap_err();
        assert_eq!(err.reason(), "malformed");
    }

    #[test]
    fn test_email_claim_used_when_sub_missing() {
        let signer = signer();
        let claims = JwtClaims {
            sub: String::new(),
            email: Some("admin@corp.test".to_string()),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        let decoded = signer.verify(&token).unwrap();
        assert_eq!(decoded.subject, "admin@corp.test");
        assert_eq!(decoded.role, Role::Admin);
    }
}
