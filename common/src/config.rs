// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, Environment, File};

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("auth.jwt_secret must be supplied (JWT_SECRET or APP_AUTH__JWT_SECRET)")]
    MissingSecret,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Central configuration for the proxy, read once at startup
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub synthesis: SynthesisConfig,
    pub routing: RoutingConfig,
    pub health: HealthConfig,

    // Static file serving configuration
    pub static_files: StaticFilesConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Time allowed until the upstream response headers arrive
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret shared with the upstream API. No default is provided.
    pub jwt_secret: String,
    /// Substring of a subject that marks an administrative identity
    pub admin_marker: String,
    pub token_ttl_secs: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub enabled: bool,
    /// Path prefixes for which tokens may be synthesized. Empty allows all.
    pub allow_paths: Vec<String>,
    pub admin_subject: String,
    pub standard_subject: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub proxy_prefixes: Vec<String>,
    /// Namespaces whose upstream path depends on the caller role
    pub role_scoped_namespaces: Vec<String>,
    pub admin_keeps_api_prefix: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub path: String,
    pub timeout_ms: u64,
    pub auth_retry_after: u64,
    pub endpoint_retry_after: u64,
    pub down_retry_after: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub path: String,
    pub index: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            connect_timeout_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            admin_marker: "admin".to_string(),
            token_ttl_secs: 86400, // 24 hours
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_paths: Vec::new(),
            admin_subject: "admin@localhost".to_string(),
            standard_subject: "user@localhost".to_string(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            proxy_prefixes: ["/api", "/auth", "/login", "/users", "/probes"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            role_scoped_namespaces: vec!["probes".to_string()],
            admin_keeps_api_prefix: true,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            timeout_ms: 1500,
            auth_retry_after: 3,
            endpoint_retry_after: 5,
            down_retry_after: 30,
        }
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            path: "./static".to_string(),
            index: "index.html".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// `host:port`, used for the outbound Host header
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config: Config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP_UPSTREAM__HOST
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("synthesis.allow_paths")
                    .with_list_parse_key("routing.proxy_prefixes")
                    .with_list_parse_key("routing.role_scoped_namespaces"),
            )
            // Plain names used by the deployment scripts win over everything else
            .set_override_option("upstream.host", env::var("UPSTREAM_HOST").ok())?
            .set_override_option("upstream.port", env::var("UPSTREAM_PORT").ok())?
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .set_override_option("static_files.path", env::var("STATIC_FILES_PATH").ok())?
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files and environment, falling back to plain environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");
                Self::from_plain_env()
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_plain_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("UPSTREAM_HOST") {
            config.upstream.host = host;
        }
        if let Some(port) = env::var("UPSTREAM_PORT").ok().and_then(|v| v.parse().ok()) {
            config.upstream.port = port;
        }
        if let Ok(secret) = env::var("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            config.server.port = port;
        }
        if let Ok(path) = env::var("STATIC_FILES_PATH") {
            config.static_files.path = path;
        }

        config
    }

    /// Reject configurations the proxy cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.upstream.host.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.host is empty".into()));
        }
        if self.upstream.port == 0 || self.server.port == 0 {
            return Err(ConfigError::Invalid("ports must be non-zero".into()));
        }
        if self.auth.admin_marker.is_empty() {
            return Err(ConfigError::Invalid("auth.admin_marker is empty".into()));
        }
        if !self.synthesis.admin_subject.contains(&self.auth.admin_marker) {
            return Err(ConfigError::Invalid(format!(
                "synthesis.admin_subject '{}' does not contain admin marker '{}'",
                self.synthesis.admin_subject, self.auth.admin_marker
            )));
        }
        if self.synthesis.standard_subject.contains(&self.auth.admin_marker) {
            return Err(ConfigError::Invalid(format!(
                "synthesis.standard_subject '{}' contains admin marker '{}'",
                self.synthesis.standard_subject, self.auth.admin_marker
            )));
        }

        let health = &self.health;
        if health.down_retry_after < 5
            || health.down_retry_after <= health.endpoint_retry_after
            || health.down_retry_after <= health.auth_retry_after
        {
            return Err(ConfigError::Invalid(
                "health.down_retry_after must be >= 5 and exceed the endpoint retry values".into(),
            ));
        }
        if !health.path.starts_with('/') {
            return Err(ConfigError::Invalid("health.path must start with '/'".into()));
        }

        Ok(())
    }
}
