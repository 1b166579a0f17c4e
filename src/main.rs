mod accrual;
mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod reconcile;
mod server;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("🚀 Starting accrual backend");

    let config = config::Config::from_env().context("failed to load configuration")?;

    let state = bootstrap::initialize_app_state(&config)
        .await
        .context("failed to initialize application state")?;

    // Start the reconciliation loop
    let reconciler = state.reconciler.clone();
    let reconcile_task = reconciler.start();
    info!("✅ Order reconciliation loop started");

    // Create HTTP server
    let app = server::create_app(state);

    let shutdown_reconciler = reconciler.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
        }
        info!("🛑 Shutdown signal received");
        shutdown_reconciler.stop();
    };

    // Run the Server
    server::run_server(app, &config.bind_address, shutdown)
        .await
        .context("HTTP server failed")?;

    // Covers the server exiting on its own as well
    reconciler.stop();
    if let Err(e) = reconcile_task.await {
        error!("Reconciliation task ended abnormally: {:?}", e);
    }

    info!("👋 Shutdown complete");
    Ok(())
}
