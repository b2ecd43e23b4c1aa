//! Timely NEP timetable engine - Axum Server

use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timely_scheduler::api::{self, AppState};
use timely_scheduler::config::ServiceConfig;
use timely_scheduler::console;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("timely_scheduler=info".parse()?),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let addr = config.bind_addr;
    console::print_banner();

    let state = Arc::new(AppState::new(config));
    let runs = state.runs.clone();

    let app = api::router(state).fallback_service(ServeDir::new("static"));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runs.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
