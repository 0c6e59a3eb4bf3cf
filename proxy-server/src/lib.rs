// proxy-server/src/lib.rs
pub mod auth;
pub mod error;
pub mod forwarder;
pub mod health;
pub mod middleware;
pub mod normalize;
pub mod proxy;
pub mod state;
pub mod static_files;

pub use error::{ProxyError, StartupError};
pub use state::ProxyState;

use actix_web::web;

/// Register proxy scopes first, then the SPA bundle for everything else
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<ProxyState>) {
    cfg.app_data(state.clone());
    proxy::configure(cfg, state.proxy_prefixes());
    static_files::configure(cfg, state.spa().clone());
}
