//! Kiln server entry point.

use std::sync::Arc;

use kiln_core::catalog::{self, SystemCatalog};
use kiln_core::{AppContext, Diagnostics};
use kiln_server::{AppState, ServerConfig, ServerError, router};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("Starting Kiln server...");
    if let Err(err) = run().await {
        error!(error = %err, "Kiln server failed");
        std::process::exit(1);
    }
    info!("Kiln server stopped.");
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::load()?;

    let catalog = Arc::new(SystemCatalog::default_blueprint());
    catalog::install_global(catalog.clone())?;
    let state = Arc::new(AppState::connect(&config, catalog).await?);

    let ctx = AppContext::background();
    let mut diagnostics = Diagnostics::new("bootstrap");
    let outcome = state.bootstrap(&ctx, &mut diagnostics).await;
    diagnostics.complete();
    match outcome {
        Ok(report) => info!(
            applied = ?report.applied,
            skipped = ?report.skipped,
            "Bootstrap complete"
        ),
        Err(failure) => {
            error!(diagnostics = %diagnostics.to_json(), "Bootstrap failed");
            return Err(failure.into());
        }
    }

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(address = %config.server.bind, "Kiln server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
