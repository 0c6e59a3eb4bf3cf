// proxy-server/src/normalize.rs
//! Rewrites inbound request paths into the form the upstream API routes on.
//!
//! The frontend has accumulated several conventions for the same endpoints
//! (`/api/api/...`, `/api/...`, bare `/users/me`, bare `/probes`). Rules are
//! evaluated in a fixed order and the first match wins.

use common::{Role, RoutingConfig};

const API_PREFIX: &str = "/api";

/// Inputs visible to every rule
pub struct PathQuery<'a> {
    /// Inbound path with a guaranteed leading slash
    pub original: &'a str,
    /// `original` with every leading `/api` segment removed
    pub collapsed: &'a str,
    pub role: Role,
    settings: &'a RuleSettings,
}

struct RuleSettings {
    role_scoped_namespaces: Vec<String>,
    admin_keeps_api_prefix: bool,
}

/// A single (predicate, rewrite) pair
pub struct PathRule {
    pub name: &'static str,
    matches: fn(&PathQuery<'_>) -> bool,
    rewrite: fn(&PathQuery<'_>) -> String,
}

/// Result of normalizing one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub path: String,
    pub rule: &'static str,
}

/// Ordered rule table, built once at startup
pub struct PathNormalizer {
    rules: Vec<PathRule>,
    settings: RuleSettings,
}

impl PathNormalizer {
    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            rules: vec![
                PathRule { name: "login", matches: is_login, rewrite: rewrite_login },
                PathRule { name: "profile", matches: is_profile, rewrite: rewrite_profile },
                PathRule { name: "admin", matches: is_admin, rewrite: with_api_prefix },
                PathRule { name: "role_scoped", matches: is_role_scoped, rewrite: rewrite_role_scoped },
            ],
            settings: RuleSettings {
                role_scoped_namespaces: routing.role_scoped_namespaces.clone(),
                admin_keeps_api_prefix: routing.admin_keeps_api_prefix,
            },
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).chain(std::iter::once(GENERIC_RULE)).collect()
    }

    pub fn normalize(&self, path: &str, role: Role) -> String {
        self.normalize_traced(path, role).path
    }

    /// Normalize and report which rule produced the result
    pub fn normalize_traced(&self, path: &str, role: Role) -> Normalized {
        let original = with_leading_slash(path);
        let query = PathQuery {
            original: &original,
            collapsed: collapse_api_prefix(&original),
            role,
            settings: &self.settings,
        };

        for rule in &self.rules {
            if (rule.matches)(&query) {
                return Normalized { path: (rule.rewrite)(&query), rule: rule.name };
            }
        }

        tracing::debug!(path = %original, "No specific path rule matched, collapsing /api prefix");
        Normalized { path: with_leading_slash(query.collapsed), rule: GENERIC_RULE }
    }
}

const GENERIC_RULE: &str = "generic";

/// Login endpoints are never credential-synthesized or role-rewritten
pub fn is_login_path(path: &str) -> bool {
    has_segment(path, "login")
}

pub fn is_registration_path(path: &str) -> bool {
    has_segment(path, "register") || has_segment(path, "signup")
}

/// Anything under an `admin` segment
pub fn is_admin_path(path: &str) -> bool {
    has_segment(path, "admin")
}

/// Endpoints whose failures get the short retry hint
pub fn is_auth_path(normalized: &str) -> bool {
    normalized == "/login"
        || normalized == "/users/me"
        || normalized == "/auth"
        || normalized.starts_with("/auth/")
}

fn has_segment(path: &str, segment: &str) -> bool {
    path.split('/').any(|s| s == segment)
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// `/api/api/foo` and `/api/foo` both become `/foo`; `/apix` is left alone
fn collapse_api_prefix(path: &str) -> &str {
    let mut rest = path;
    while let Some(tail) = rest.strip_prefix(API_PREFIX) {
        if tail.is_empty() || tail.starts_with('/') {
            rest = tail;
        } else {
            break;
        }
    }
    rest
}

fn is_login(q: &PathQuery<'_>) -> bool {
    is_login_path(q.original)
}

fn rewrite_login(q: &PathQuery<'_>) -> String {
    if q.original.contains("/auth/login") {
        "/auth/login".to_string()
    } else {
        "/login".to_string()
    }
}

fn is_profile(q: &PathQuery<'_>) -> bool {
    q.collapsed.trim_end_matches('/') == "/users/me"
}

fn rewrite_profile(_: &PathQuery<'_>) -> String {
    "/users/me".to_string()
}

fn is_admin(q: &PathQuery<'_>) -> bool {
    is_admin_path(q.original)
}

fn with_api_prefix(q: &PathQuery<'_>) -> String {
    if q.collapsed.is_empty() || q.collapsed == "/" {
        API_PREFIX.to_string()
    } else {
        format!("{}{}", API_PREFIX, q.collapsed)
    }
}

fn is_role_scoped(q: &PathQuery<'_>) -> bool {
    q.settings
        .role_scoped_namespaces
        .iter()
        .any(|ns| has_segment(q.original, ns))
}

// Admin callers reach these namespaces under /api, everyone else on the bare path
fn rewrite_role_scoped(q: &PathQuery<'_>) -> String {
    if q.role == Role::Admin && q.settings.admin_keeps_api_prefix {
        with_api_prefix(q)
    } else {
        with_leading_slash(q.collapsed)
    }
}
