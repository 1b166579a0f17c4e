use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AccrualError;
use crate::ledger::models::OrderStatus;

/// Status reported by the accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    /// Local order status this answer drives an order towards
    pub fn order_status(&self) -> OrderStatus {
        match self {
            AccrualStatus::Registered | AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, AccrualStatus::Invalid | AccrualStatus::Processed)
    }
}

/// Raw body of `GET /api/orders/{number}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}

/// A checked answer for one order
///
/// `accrual` is present iff `status` is PROCESSED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualResult {
    pub order: String,
    pub status: AccrualStatus,
    pub accrual: Option<Decimal>,
}

impl AccrualResponse {
    /// Check the body against the order it was requested for.
    ///
    /// An amount attached to a non-PROCESSED status is dropped; a PROCESSED
    /// answer without a usable amount is a protocol error.
    pub fn into_result(self, expected_order: &str) -> Result<AccrualResult, AccrualError> {
        if self.order != expected_order {
            return Err(AccrualError::OrderMismatch {
                expected: expected_order.to_string(),
                actual: self.order,
            });
        }

        let accrual = match (self.status, self.accrual) {
            (AccrualStatus::Processed, Some(amount)) if !amount.is_sign_negative() => Some(amount),
            (AccrualStatus::Processed, _) => {
                return Err(AccrualError::InconsistentAccrual(
                    "PROCESSED without a non-negative accrual".to_string(),
                ));
            }
            (_, _) => None,
        };

        Ok(AccrualResult {
            order: self.order,
            status: self.status,
            accrual,
        })
    }
}

/// Typed outcome of a single accrual query
#[derive(Debug)]
pub enum AccrualClassification {
    /// The service knows the order; the status may still be non-final
    Accepted(AccrualResult),
    /// 204: the service has no record of the order yet
    NotYetRegistered,
    /// 429: wait this long before the next pass
    RateLimited { wait: Duration },
    /// Transport failure, timeout, unexpected status or malformed body
    Unavailable(AccrualError),
}

impl AccrualClassification {
    pub fn label(&self) -> &'static str {
        match self {
            AccrualClassification::Accepted(_) => "accepted",
            AccrualClassification::NotYetRegistered => "not_yet_registered",
            AccrualClassification::RateLimited { .. } => "rate_limited",
            AccrualClassification::Unavailable(_) => "unavailable",
        }
    }
}
