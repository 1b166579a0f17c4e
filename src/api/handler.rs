use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::error::{AppError, AppResult};
use crate::reconcile::OrderReconciler;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<OrderReconciler>,
}

/// Liveness probe
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Current loop state, backoff mode and last pass
/// GET /api/internal/reconciler
pub async fn get_reconciler_status(
    State(state): State<AppState>,
) -> Json<ReconcilerStatusResponse> {
    let reconciler = &state.reconciler;
    let backoff = reconciler.backoff_state();

    Json(ReconcilerStatusResponse {
        state: reconciler.state(),
        mode: backoff.mode,
        interval_ms: millis(backoff.interval),
        next_pass_in_ms: millis(reconciler.next_pass_in()),
        in_flight: reconciler.in_flight(),
        last_pass: reconciler.last_pass().map(PassReportResponse::from),
    })
}

/// Run one reconciliation pass now, alongside the background loop
/// POST /api/internal/reconciler/run
///
/// Refused with 409 while the accrual service's rate-limit wait is running.
pub async fn trigger_reconcile_pass(
    State(state): State<AppState>,
) -> AppResult<Json<PassReportResponse>> {
    info!("Manual reconciliation pass requested");
    let report = state.reconciler.run_pass().await;
    if let Some(remaining) = report.deferred {
        return Err(AppError::RateLimited(remaining));
    }
    Ok(Json(PassReportResponse::from(report)))
}
