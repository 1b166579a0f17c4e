// Accrual reconciliation: polling loop, backoff and in-flight dedupe
pub mod backoff;
pub mod in_flight;
pub mod reconciler;

pub use backoff::{BackoffController, BackoffMode, PassOutcome};
pub use reconciler::{OrderReconciler, PassReport, ReconcilerState};
