use super::models::*;
use crate::error::{AppError, AppResult, OrderError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::BigDecimal;
use sqlx::{prelude::FromRow, PgPool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Storage operations the reconciler depends on
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// One page of non-terminal orders, oldest upload first, at most `limit`
    /// of them. With `after`, the page starts strictly after that cursor.
    async fn fetch_pending_orders(
        &self,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> AppResult<Vec<Order>>;

    /// Move an order to `status`, crediting `accrual` to the owner's balance
    /// in the same unit of work when `status` is PROCESSED.
    ///
    /// Terminal orders and non-forward moves are left untouched and reported
    /// as [`ApplyOutcome::Unchanged`].
    async fn apply_order_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> AppResult<ApplyOutcome>;
}

#[derive(FromRow)]
struct OrderRow {
    number: String,
    user_id: Uuid,
    status: OrderStatus,
    accrual: Option<BigDecimal>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> AppResult<Self> {
        Ok(Order {
            number: row.number,
            user_id: row.user_id,
            status: row.status,
            accrual: row.accrual.as_ref().map(to_decimal).transpose()?,
            uploaded_at: row.uploaded_at,
        })
    }
}

fn to_decimal(value: &BigDecimal) -> AppResult<Decimal> {
    Ok(Decimal::from_str(&value.to_string())?)
}

fn to_big_decimal(value: Decimal) -> AppResult<BigDecimal> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| AppError::Internal(format!("Decimal conversion error: {:?}", e)))
}

/// PostgreSQL-backed order store - THE source of truth for orders and balances
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn fetch_pending_orders(
        &self,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
              AND ($1::timestamptz IS NULL OR (uploaded_at, number) > ($1, $2::text))
            ORDER BY uploaded_at ASC, number ASC
            LIMIT $3
            "#,
        )
        .bind(after.map(|c| c.uploaded_at))
        .bind(after.map(|c| c.number.clone()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn apply_order_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> AppResult<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent appliers of the same order
        let current = sqlx::query_as::<_, (OrderStatus, Uuid)>(
            r#"
            SELECT status, user_id
            FROM orders
            WHERE number = $1
            FOR UPDATE
            "#,
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let (current_status, user_id) =
            current.ok_or_else(|| OrderError::NotFound(number.to_string()))?;

        if current_status.plan_transition(status, accrual)? == Transition::NoOp {
            debug!("Order {} already {}, ignoring {}", number, current_status, status);
            tx.rollback().await?;
            return Ok(ApplyOutcome::Unchanged);
        }

        let amount = accrual.map(to_big_decimal).transpose()?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3
            WHERE number = $1
            "#,
        )
        .bind(number)
        .bind(status)
        .bind(amount.clone())
        .execute(&mut *tx)
        .await?;

        if let Some(amount) = amount {
            let credited = sqlx::query(
                r#"
                UPDATE users
                SET balance = balance + $2
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

            if credited.rows_affected() == 0 {
                // Dropping `tx` rolls the status change back as well
                return Err(AppError::Internal(format!(
                    "Owner {} of order {} does not exist",
                    user_id, number
                )));
            }
        }

        tx.commit().await?;

        info!("📦 Order {} moved {} -> {}", number, current_status, status);
        Ok(ApplyOutcome::Updated)
    }
}
