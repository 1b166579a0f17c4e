use crate::error::{AppResult, OrderError};
use crate::ledger::models::{ApplyOutcome, Order, OrderStatus, PendingCursor, Transition};
use crate::ledger::repository::OrderStore;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Books {
    orders: HashMap<String, Order>,
    balances: HashMap<Uuid, Decimal>,
}

/// In-process order store
///
/// Orders and balances live behind one lock so a PROCESSED result and its
/// credit are applied together.
pub struct InMemoryOrderStore {
    books: tokio::sync::RwLock<Books>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            books: tokio::sync::RwLock::new(Books::default()),
        }
    }

    pub async fn insert_order(&self, order: Order) -> AppResult<Order> {
        let mut books = self.books.write().await;
        books.balances.entry(order.user_id).or_insert(Decimal::ZERO);
        books.orders.insert(order.number.clone(), order.clone());
        Ok(order)
    }

    pub async fn get_order(&self, number: &str) -> AppResult<Order> {
        let books = self.books.read().await;
        books
            .orders
            .get(number)
            .cloned()
            .ok_or_else(|| OrderError::NotFound(number.to_string()).into())
    }

    pub async fn balance_of(&self, user_id: Uuid) -> Decimal {
        let books = self.books.read().await;
        books.balances.get(&user_id).copied().unwrap_or(Decimal::ZERO)
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn fetch_pending_orders(
        &self,
        after: Option<&PendingCursor>,
        limit: i64,
    ) -> AppResult<Vec<Order>> {
        let books = self.books.read().await;
        let mut pending: Vec<Order> = books
            .orders
            .values()
            .filter(|o| o.is_pending())
            .filter(|o| after.map_or(true, |cursor| cursor.precedes(o)))
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn apply_order_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> AppResult<ApplyOutcome> {
        let mut books = self.books.write().await;
        let order = books
            .orders
            .get_mut(number)
            .ok_or_else(|| OrderError::NotFound(number.to_string()))?;

        if order.status.plan_transition(status, accrual)? == Transition::NoOp {
            return Ok(ApplyOutcome::Unchanged);
        }

        order.status = status;
        order.accrual = accrual;
        let user_id = order.user_id;

        if let Some(amount) = accrual {
            *books.balances.entry(user_id).or_insert(Decimal::ZERO) += amount;
        }

        Ok(ApplyOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_pending_orders_oldest_first_and_limited() {
        let store = InMemoryOrderStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        store.insert_order(Order::new("18", owner, now)).await.unwrap();
        store
            .insert_order(Order::new("26", owner, now - Duration::seconds(30)))
            .await
            .unwrap();
        store
            .insert_order(Order::new("34", owner, now - Duration::seconds(10)))
            .await
            .unwrap();
        let mut done = Order::new("42", owner, now - Duration::seconds(60));
        done.status = OrderStatus::Invalid;
        store.insert_order(done).await.unwrap();

        let pending = store.fetch_pending_orders(None, 10).await.unwrap();
        let numbers: Vec<&str> = pending.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["26", "34", "18"]);

        let limited = store.fetch_pending_orders(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].number, "26");

        let rest = store
            .fetch_pending_orders(Some(&limited[1].cursor()), 2)
            .await
            .unwrap();
        let numbers: Vec<&str> = rest.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["18"]);
    }

    #[tokio::test]
    async fn test_cursor_breaks_upload_time_ties_by_number() {
        let store = InMemoryOrderStore::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        for number in ["34", "18", "26"] {
            store.insert_order(Order::new(number, owner, now)).await.unwrap();
        }

        let first = store.fetch_pending_orders(None, 1).await.unwrap();
        assert_eq!(first[0].number, "18");
        let second = store
            .fetch_pending_orders(Some(&first[0].cursor()), 1)
            .await
            .unwrap();
        assert_eq!(second[0].number, "26");
        let third = store
            .fetch_pending_orders(Some(&second[0].cursor()), 1)
            .await
            .unwrap();
        assert_eq!(third[0].number, "34");
        let done = store
            .fetch_pending_orders(Some(&third[0].cursor()), 1)
            .await
            .unwrap();
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn test_processed_credits_exactly_once() {
        let store = InMemoryOrderStore::new();
        let owner = Uuid::new_v4();
        store.insert_order(Order::new("18", owner, Utc::now())).await.unwrap();

        let first = store
            .apply_order_result("18", OrderStatus::Processed, Some(dec!(500)))
            .await
            .unwrap();
        let second = store
            .apply_order_result("18", OrderStatus::Processed, Some(dec!(500)))
            .await
            .unwrap();

        assert_eq!(first, ApplyOutcome::Updated);
        assert_eq!(second, ApplyOutcome::Unchanged);
        assert_eq!(store.balance_of(owner).await, dec!(500));

        let order = store.get_order("18").await.unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, Some(dec!(500)));
    }

    #[tokio::test]
    async fn test_amount_with_other_status_is_rejected() {
        let store = InMemoryOrderStore::new();
        let owner = Uuid::new_v4();
        store.insert_order(Order::new("18", owner, Utc::now())).await.unwrap();

        let result = store
            .apply_order_result("18", OrderStatus::Invalid, Some(dec!(10)))
            .await;
        assert!(result.is_err());

        let order = store.get_order("18").await.unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.accrual, None);
        assert_eq!(store.balance_of(owner).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let result = store
            .apply_order_result("18", OrderStatus::Processing, None)
            .await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::Order(OrderError::NotFound(_)))
        ));
    }
}
