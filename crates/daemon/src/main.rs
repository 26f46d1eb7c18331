//! Process entry point (§4.N). Logging is initialized before anything
//! else; every subsequent line (tunnel scraping, download retries,
//! graph-rewrite warnings, dependency-sweep results) goes through the same
//! `tracing` layer, level-filtered by `RUST_LOG`, never raw `println!`.

use imagebridge_core::AgentConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AgentConfig::from_env());
    let port = config.local_http_port;

    let state = imagebridge_daemon::bootstrap::bootstrap(config).await;
    imagebridge_daemon::bootstrap::register_initial(&state).await;
    imagebridge_daemon::bootstrap::start_background_services(&state).await;

    let app = imagebridge_daemon::routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind local HTTP surface");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "agent HTTP surface listening");

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "HTTP server exited with an error");
    }

    // §4.N: the tunnel-stop hook runs on shutdown; in-flight downloads are
    // left to terminate with their `.tmp` files intact.
    state.tunnel.stop().await;
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl+C signal handler");
    }
    tracing::info!("shutdown signal received");
}
