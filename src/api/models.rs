use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::reconcile::{BackoffMode, PassOutcome, PassReport, ReconcilerState};

/// Whole milliseconds, saturating at `u64::MAX`
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Snapshot of the reconciliation loop
#[derive(Debug, Serialize)]
pub struct ReconcilerStatusResponse {
    pub state: ReconcilerState,
    pub mode: BackoffMode,
    pub interval_ms: u64,
    pub next_pass_in_ms: u64,
    pub in_flight: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassReportResponse>,
}

#[derive(Debug, Serialize)]
pub struct PassReportResponse {
    pub queried: usize,
    pub answered: usize,
    pub not_registered: usize,
    pub unavailable: usize,
    pub updated: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_ms: Option<u64>,
    pub cancelled: bool,
    pub next_mode: BackoffMode,
    pub next_interval_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl From<PassReport> for PassReportResponse {
    fn from(report: PassReport) -> Self {
        let PassOutcome {
            queried,
            answered,
            not_registered,
            unavailable,
            updated,
            skipped,
            rate_limited,
            cancelled,
        } = report.outcome;

        Self {
            queried,
            answered,
            not_registered,
            unavailable,
            updated,
            skipped,
            rate_limited_ms: rate_limited.map(millis),
            cancelled,
            next_mode: report.next.mode,
            next_interval_ms: millis(report.next.interval),
            finished_at: report.finished_at,
        }
    }
}
