use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{get_reconciler_status, health_check, trigger_reconcile_pass, AppState};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        // Operational endpoints for the reconciliation loop
        .nest(
            "/api/internal",
            Router::new()
                .route("/reconciler", get(get_reconciler_status))
                .route("/reconciler/run", post(trigger_reconcile_pass)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(60))),
        )
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server<F>(
    app: Router,
    bind_address: &str,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
