// Order reconciler - drives pending orders to a terminal status
//
// Pass flow:
// 1. Page through pending orders (oldest first)
// 2. Query the accrual service for each one not already in flight
// 3. Apply status / accrual updates through the store
// 4. Feed the pass outcome into the backoff controller
// 5. Sleep until the shared deadline or until stopped

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::{BackoffController, BackoffMode, BackoffState, PassOutcome};
use super::in_flight::InFlightGuard;
use crate::accrual::{AccrualClassification, AccrualSource};
use crate::ledger::{
    luhn,
    models::{ApplyOutcome, Order, OrderStatus, PendingCursor},
    OrderStore,
};

/// Stand-in deadline for waits too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerState {
    Running,
    Stopped,
}

/// Summary of one pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub next: BackoffState,
    /// Remaining rate-limit wait when the pass was not run at all
    pub deferred: Option<Duration>,
    pub finished_at: DateTime<Utc>,
}

/// Backoff state plus the earliest instant the next pass may query
#[derive(Debug, Clone, Copy)]
struct Schedule {
    state: BackoffState,
    not_before: Instant,
}

pub struct OrderReconciler {
    store: Arc<dyn OrderStore>,
    accrual: Arc<dyn AccrualSource>,
    guard: Arc<InFlightGuard>,
    backoff: BackoffController,
    schedule: Mutex<Schedule>,
    rescheduled: Notify,
    last_pass: Mutex<Option<PassReport>>,
    batch_size: i64,
    shutdown: watch::Sender<bool>,
}

impl OrderReconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        accrual: Arc<dyn AccrualSource>,
        backoff: BackoffController,
        batch_size: i64,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            accrual,
            guard: Arc::new(InFlightGuard::new()),
            schedule: Mutex::new(Schedule {
                state: backoff.initial(),
                not_before: Instant::now(),
            }),
            rescheduled: Notify::new(),
            backoff,
            last_pass: Mutex::new(None),
            batch_size,
            shutdown,
        }
    }

    /// Start the reconciliation loop (runs in background)
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move { reconciler.run().await })
    }

    /// Stop the loop and any pass in progress. There is no restart.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ReconcilerState {
        if *self.shutdown.borrow() {
            ReconcilerState::Stopped
        } else {
            ReconcilerState::Running
        }
    }

    pub fn backoff_state(&self) -> BackoffState {
        self.schedule.lock().state
    }

    /// Time left until the next pass is due
    pub fn next_pass_in(&self) -> Duration {
        self.schedule
            .lock()
            .not_before
            .saturating_duration_since(Instant::now())
    }

    pub fn in_flight(&self) -> usize {
        self.guard.len()
    }

    pub fn last_pass(&self) -> Option<PassReport> {
        self.last_pass.lock().clone()
    }

    fn rate_limit_remaining(&self) -> Option<Duration> {
        let schedule = self.schedule.lock();
        if schedule.state.mode != BackoffMode::RateLimited {
            return None;
        }
        let remaining = schedule.not_before.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then_some(remaining)
    }

    async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        info!("🔄 Order reconciler started");

        while !*shutdown.borrow() {
            self.run_pass().await;
            if !self.sleep_until_due(&mut shutdown).await {
                break;
            }
        }

        info!("✓ Order reconciler stopped");
    }

    /// Sleep until the shared deadline, following it whenever another pass
    /// moves it. Returns `false` once stop is requested.
    async fn sleep_until_due(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            // Registered before the deadline is read so no reschedule is missed
            let rescheduled = self.rescheduled.notified();
            let deadline = self.schedule.lock().not_before;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                _ = rescheduled => {}
                _ = wait_for_stop(shutdown) => return false,
            }
        }
    }

    /// Run one pass over every pending order.
    ///
    /// Safe to call while the background loop is running; orders already in
    /// flight are skipped. While a rate-limit wait is running nothing is
    /// queried and the report carries the remaining wait.
    pub async fn run_pass(&self) -> PassReport {
        if let Some(remaining) = self.rate_limit_remaining() {
            debug!("Rate limit active for another {:?}, pass deferred", remaining);
            return PassReport {
                outcome: PassOutcome::default(),
                next: self.backoff_state(),
                deferred: Some(remaining),
                finished_at: Utc::now(),
            };
        }

        let mut shutdown = self.shutdown.subscribe();
        let mut outcome = PassOutcome::default();
        let page_size = usize::try_from(self.batch_size).unwrap_or(usize::MAX);
        let mut cursor: Option<PendingCursor> = None;

        'pages: loop {
            let page = match self
                .store
                .fetch_pending_orders(cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!("❌ Failed to fetch pending orders: {:?}", e);
                    break;
                }
            };

            for order in &page {
                if self
                    .reconcile_order(order, &mut outcome, &mut shutdown)
                    .await
                    .is_break()
                {
                    break 'pages;
                }
            }

            match page.last() {
                Some(last) if page.len() >= page_size => cursor = Some(last.cursor()),
                _ => break,
            }
        }

        let next = self.advance_backoff(&outcome);
        debug!(
            queried = outcome.queried,
            updated = outcome.updated,
            skipped = outcome.skipped,
            next_interval = ?next.interval,
            "Reconciliation pass finished"
        );

        let report = PassReport {
            outcome,
            next,
            deferred: None,
            finished_at: Utc::now(),
        };
        *self.last_pass.lock() = Some(report.clone());
        report
    }

    /// Query one order and apply the answer. Breaks when the pass must end.
    async fn reconcile_order(
        &self,
        order: &Order,
        outcome: &mut PassOutcome,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlFlow<()> {
        if *shutdown.borrow() {
            outcome.cancelled = true;
            return ControlFlow::Break(());
        }

        if !order.is_pending() {
            outcome.skipped += 1;
            return ControlFlow::Continue(());
        }

        if !luhn::is_valid(&order.number) {
            warn!("⏭️ Order {} fails Luhn check, not querying", order.number);
            outcome.skipped += 1;
            return ControlFlow::Continue(());
        }

        // Held until the result is applied
        let Some(_permit) = self.guard.permit(&order.number) else {
            debug!("Order {} already in flight", order.number);
            outcome.skipped += 1;
            return ControlFlow::Continue(());
        };

        let classification = tokio::select! {
            classification = self.accrual.query(&order.number) => classification,
            _ = wait_for_stop(shutdown) => {
                outcome.cancelled = true;
                return ControlFlow::Break(());
            }
        };

        outcome.record(&classification);

        match classification {
            AccrualClassification::Accepted(result) => {
                let target = result.status.order_status();
                if result.status.is_final() || order.status == OrderStatus::New {
                    self.apply(order, target, result.accrual, outcome).await;
                }
            }
            AccrualClassification::NotYetRegistered => {
                warn!("Order {} not yet registered with accrual service", order.number);
            }
            AccrualClassification::RateLimited { wait } => {
                warn!(
                    "⏸️ Accrual service rate limited us at order {}, pausing for {:?}",
                    order.number, wait
                );
                return ControlFlow::Break(());
            }
            AccrualClassification::Unavailable(e) => {
                warn!(
                    order = %order.number,
                    error = %e,
                    "Accrual service unavailable for order"
                );
            }
        }

        ControlFlow::Continue(())
    }

    async fn apply(
        &self,
        order: &Order,
        status: OrderStatus,
        accrual: Option<Decimal>,
        outcome: &mut PassOutcome,
    ) {
        match self
            .store
            .apply_order_result(&order.number, status, accrual)
            .await
        {
            Ok(ApplyOutcome::Updated) => outcome.updated += 1,
            Ok(ApplyOutcome::Unchanged) => {
                debug!("Order {} unchanged by {}", order.number, status);
            }
            Err(e) => {
                error!(
                    "❌ Failed to apply {} to order {}: {:?}",
                    status, order.number, e
                );
            }
        }
    }

    fn advance_backoff(&self, outcome: &PassOutcome) -> BackoffState {
        let mut schedule = self.schedule.lock();
        let next = self.backoff.next(&schedule.state, outcome);
        if next.mode != schedule.state.mode {
            info!(
                "⏰ Poll mode {:?} -> {:?}, next pass in {:?}",
                schedule.state.mode, next.mode, next.interval
            );
        }
        schedule.state = next;
        if !outcome.cancelled {
            schedule.not_before = deadline_after(Instant::now(), next.interval);
        }
        drop(schedule);

        self.rescheduled.notify_waiters();
        next
    }
}

/// `from + wait`, clamped to a far-future instant instead of overflowing
fn deadline_after(from: Instant, wait: Duration) -> Instant {
    from.checked_add(wait)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Resolves once stop has been requested
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives as long as the reconciler, so an error cannot outlive it
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
