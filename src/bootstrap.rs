use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    accrual::AccrualClient,
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::PgOrderStore,
    reconcile::{BackoffController, OrderReconciler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;
    let store = Arc::new(PgOrderStore::new(pool));

    // Accrual service client
    let accrual = Arc::new(
        AccrualClient::new(&config.accrual_address, config.accrual_timeout)?
            .with_default_retry_after(config.default_retry_after),
    );
    info!(
        "✅ Accrual client initialized for {} (timeout {:?})",
        config.accrual_address, config.accrual_timeout
    );

    let backoff = BackoffController::new(config.poll_interval, config.unavailable_interval);
    let reconciler = Arc::new(OrderReconciler::new(
        store,
        accrual,
        backoff,
        config.batch_size,
    ));
    info!(
        "✅ Order reconciler initialized (poll {:?}, unavailable {:?}, batch {})",
        config.poll_interval, config.unavailable_interval, config.batch_size
    );

    Ok(AppState { reconciler })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
