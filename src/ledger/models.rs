use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;
use uuid::Uuid;

use crate::error::OrderError;

/// Lifecycle status of a submitted order
///
/// Orders only move forward: NEW -> PROCESSING -> {PROCESSED, INVALID}.
/// PROCESSED and INVALID are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Invalid | OrderStatus::Processed => 2,
        }
    }

    /// Decide whether moving from `self` to `next` (carrying `accrual`) is an
    /// update, a no-op, or a rule violation.
    ///
    /// Shape errors (amount without PROCESSED, PROCESSED without amount) are
    /// rejected before the current status is considered, so a malformed
    /// result is never silently swallowed by a terminal order.
    pub fn plan_transition(
        self,
        next: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<Transition, OrderError> {
        match (next, accrual) {
            (OrderStatus::Processed, None) => return Err(OrderError::MissingAccrual),
            (OrderStatus::Processed, Some(amount)) if amount.is_sign_negative() => {
                return Err(OrderError::NegativeAccrual(amount));
            }
            (OrderStatus::Processed, Some(_)) => {}
            (status, Some(amount)) => {
                return Err(OrderError::AccrualWithoutProcessed { status, amount });
            }
            (_, None) => {}
        }

        if self.is_terminal() || next.rank() <= self.rank() {
            return Ok(Transition::NoOp);
        }

        Ok(Transition::Apply)
    }
}

/// Result of [`OrderStatus::plan_transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    NoOp,
}

/// What a store did with an applied result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    Unchanged,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    #[cfg(test)]
    pub fn new(number: impl Into<String>, user_id: Uuid, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            number: number.into(),
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Position of this order in the pending scan
    pub fn cursor(&self) -> PendingCursor {
        PendingCursor {
            uploaded_at: self.uploaded_at,
            number: self.number.clone(),
        }
    }
}

/// Keyset position for paging through pending orders.
///
/// Pending orders are scanned by `(uploaded_at, number)`; a page fetched
/// with a cursor starts strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCursor {
    pub uploaded_at: DateTime<Utc>,
    pub number: String,
}

impl PendingCursor {
    pub fn precedes(&self, order: &Order) -> bool {
        (self.uploaded_at, self.number.as_str()) < (order.uploaded_at, order.number.as_str())
    }
}
