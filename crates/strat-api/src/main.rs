//! Strategy-engine API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strat_api::{create_router, metrics, ApiConfig, AppState};
use strat_engine::{ReaperConfig, StuckRunReaper};

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("strat=info".parse().expect("valid directive"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::from_env();
    info!(host = %config.host, port = config.port, "Starting strat-api");

    let state = AppState::new(config.clone())
        .map_err(|e| anyhow::anyhow!("failed to build application state: {e}"))?;

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);
    let metrics_handle = metrics_enabled.then(|| {
        info!("Prometheus metrics enabled at /metrics");
        metrics::init_metrics()
    });

    // Runs abandoned mid-stage are failed by the reaper, not left to
    // poll forever.
    let reaper = StuckRunReaper::new(Arc::clone(&state.store), ReaperConfig::from_env());
    tokio::spawn(async move { reaper.run().await });

    let app = create_router(state, metrics_handle);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
