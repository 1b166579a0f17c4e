use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Set of order numbers with an outstanding accrual query
///
/// Check-and-insert is atomic, so two callers can never both hold the same
/// order number.
#[derive(Default)]
pub struct InFlightGuard {
    numbers: Mutex<HashSet<String>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `number` in flight. Returns `false` if it already was.
    pub fn try_acquire(&self, number: &str) -> bool {
        self.numbers.lock().insert(number.to_string())
    }

    pub fn release(&self, number: &str) {
        self.numbers.lock().remove(number);
    }

    /// Acquire `number` and hand back a permit that releases it on drop.
    ///
    /// Dropping the permit covers every exit path, including a cancelled
    /// future.
    pub fn permit(self: &Arc<Self>, number: &str) -> Option<InFlightPermit> {
        if !self.try_acquire(number) {
            return None;
        }
        Some(InFlightPermit {
            guard: Arc::clone(self),
            number: number.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.numbers.lock().len()
    }
}

/// Held while an order is being queried
pub struct InFlightPermit {
    guard: Arc<InFlightGuard>,
    number: String,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.guard.release(&self.number);
    }
}
