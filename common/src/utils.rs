// common/src/utils.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Setup tracing for consistent logging; `RUST_LOG` overrides the default `info` level
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    // A second call (tests, embedded use) keeps the subscriber already installed
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_tracing_is_idempotent() {
        setup_tracing();
        setup_tracing();
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800);
    }
}
