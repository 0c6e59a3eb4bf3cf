// Proxy Server - main.rs
use actix_web::{web, App, HttpServer};
use common::{setup_tracing, Config};
use proxy_server::middleware::RequestLogger;
use proxy_server::ProxyState;
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Setup tracing
    setup_tracing();

    // Load configuration; a missing signing secret stops startup here
    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let state = ProxyState::from_config(&config).map_err(|e| {
        tracing::error!("Failed to initialise proxy: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;

    if state.synthesizer.is_enabled() {
        tracing::warn!(
            allow_paths = ?config.synthesis.allow_paths,
            "Credential synthesis enabled: anonymous requests will carry placeholder tokens"
        );
    }

    // Save address before moving state into web::Data
    let server_addr = config.server.bind_addr();

    tracing::info!(
        upstream = %config.upstream.base_url(),
        static_root = %config.static_files.path,
        "Starting proxy server on {}",
        server_addr
    );

    let state_data = web::Data::new(state);

    // Start HTTP server
    HttpServer::new(move || {
        let state = state_data.clone();
        App::new()
            .wrap(RequestLogger::new())
            .configure(move |cfg| proxy_server::configure(cfg, state))
    })
    .bind(&server_addr)?
    .run()
    .await
}
