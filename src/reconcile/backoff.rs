// Poll-interval state machine
//
// Normal             -> base interval
// ServiceUnavailable -> fixed longer interval
// RateLimited        -> exactly the server-supplied wait
//
// next() is pure: no clock, no I/O.

use serde::Serialize;
use std::time::Duration;

use crate::accrual::AccrualClassification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    Normal,
    ServiceUnavailable,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub mode: BackoffMode,
    pub interval: Duration,
}

/// Aggregate of everything that happened in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Orders an accrual query was issued for
    pub queried: usize,
    /// Queries answered with a body (any external status)
    pub answered: usize,
    pub not_registered: usize,
    pub unavailable: usize,
    /// Orders whose stored status actually changed
    pub updated: usize,
    /// Orders passed over without a query
    pub skipped: usize,
    /// Last rate-limit wait seen in the pass
    pub rate_limited: Option<Duration>,
    pub cancelled: bool,
}

impl PassOutcome {
    pub fn record(&mut self, classification: &AccrualClassification) {
        self.queried += 1;
        match classification {
            AccrualClassification::Accepted(_) => self.answered += 1,
            AccrualClassification::NotYetRegistered => self.not_registered += 1,
            AccrualClassification::RateLimited { wait } => self.rate_limited = Some(*wait),
            AccrualClassification::Unavailable(_) => self.unavailable += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffController {
    base_interval: Duration,
    unavailable_interval: Duration,
}

impl BackoffController {
    pub fn new(base_interval: Duration, unavailable_interval: Duration) -> Self {
        Self {
            base_interval,
            unavailable_interval,
        }
    }

    pub fn initial(&self) -> BackoffState {
        BackoffState {
            mode: BackoffMode::Normal,
            interval: self.base_interval,
        }
    }

    /// Next state after a pass.
    ///
    /// A rate limit anywhere in the pass wins outright. A pass in which every
    /// queried order came back not-registered or unavailable slows down. Every
    /// other pass (including empty ones) runs at the base interval. A pass cut
    /// short by cancellation leaves the state as it was.
    pub fn next(&self, current: &BackoffState, outcome: &PassOutcome) -> BackoffState {
        if outcome.cancelled {
            return *current;
        }

        if let Some(wait) = outcome.rate_limited {
            return BackoffState {
                mode: BackoffMode::RateLimited,
                interval: wait,
            };
        }

        if outcome.queried > 0 && outcome.answered == 0 {
            return BackoffState {
                mode: BackoffMode::ServiceUnavailable,
                interval: self.unavailable_interval,
            };
        }

        self.initial()
    }
}
