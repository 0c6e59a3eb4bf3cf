// proxy-server/src/static_files.rs
use actix_files::{Files, NamedFile};
use actix_web::dev::{fn_service, ServiceRequest, ServiceResponse};
use actix_web::{web, Error, HttpResponse};
use std::path::PathBuf;

use common::StaticFilesConfig;

// Configuration for serving the single-page bundle
#[derive(Clone, Debug)]
pub struct SpaConfig {
    pub root_path: PathBuf,
    pub index_file: String,
    /// Paths owned by the proxy; the SPA never answers them
    pub proxy_prefixes: Vec<String>,
}

impl SpaConfig {
    pub fn new(config: &StaticFilesConfig, proxy_prefixes: Vec<String>) -> Self {
        Self {
            root_path: PathBuf::from(&config.path),
            index_file: config.index.clone(),
            proxy_prefixes,
        }
    }

    fn index_path(&self) -> PathBuf {
        self.root_path.join(&self.index_file)
    }
}

/// Segment-aware prefix match: `/users` covers `/users/1` but not `/usersettings`
pub fn is_proxy_eligible(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
    })
}

// Fallback for paths with no matching file: hand out the index document
async fn spa_index(req: ServiceRequest, config: SpaConfig) -> Result<ServiceResponse, Error> {
    let (req, _) = req.into_parts();

    // Don't serve index.html for API routes
    if is_proxy_eligible(req.path(), &config.proxy_prefixes) {
        return Ok(ServiceResponse::new(req, HttpResponse::NotFound().finish()));
    }

    let file = NamedFile::open_async(config.index_path()).await?;
    let res = file.into_response(&req);
    Ok(ServiceResponse::new(req, res))
}

// Configure static file serving with SPA support
pub fn configure(cfg: &mut web::ServiceConfig, config: SpaConfig) {
    if !config.root_path.is_dir() {
        tracing::warn!(
            path = %config.root_path.display(),
            "Static bundle directory not found; non-API paths will return 404"
        );
    }

    let fallback = config.clone();
    cfg.service(
        Files::new("/", &config.root_path)
            .index_file(&config.index_file)
            .prefer_utf8(true)
            .use_etag(true)
            .use_last_modified(true)
            .default_handler(fn_service(move |req: ServiceRequest| {
                spa_index(req, fallback.clone())
            })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn prefixes() -> Vec<String> {
        vec!["/api".to_string(), "/users".to_string()]
    }

    #[::core::prelude::v1::test]
    fn test_proxy_eligibility() {
        let prefixes = prefixes();
        assert!(is_proxy_eligible("/api", &prefixes));
        assert!(is_proxy_eligible("/api/api/users/me", &prefixes));
        assert!(is_proxy_eligible("/users/me", &prefixes));
        assert!(!is_proxy_eligible("/usersettings", &prefixes));
        assert!(!is_proxy_eligible("/dashboard", &prefixes));
    }

    #[actix_web::test]
    async fn test_serves_assets_and_index_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>spa</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

        let spa = SpaConfig {
            root_path: dir.path().to_path_buf(),
            index_file: "index.html".to_string(),
            proxy_prefixes: prefixes(),
        };
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, spa))).await;

        let req = test::TestRequest::get().uri("/app.js").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "console.log(1)");

        let req = test::TestRequest::get().uri("/settings/profile").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "<html>spa</html>");

        let req = test::TestRequest::get().uri("/api/unknown").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
