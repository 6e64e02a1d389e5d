//! Order persistence: the [`OrderStore`] contract plus PostgreSQL and
//! in-memory implementations.
//!
//! The store owns all durable order state and the append-only audit log.
//! Every update is atomic, and updates to the same order are serialized
//! so two concurrent retries can never observe the same `retry_count`.

pub mod filter;
pub mod memory;
pub mod postgres;

pub use filter::{OrderFilter, OrderSort};
pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;

use crate::audit::{AuditRecord, NewAuditRecord};
use crate::domain::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate};
use crate::error::EngineError;

/// Durable storage contract for orders and their audit history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with status `pending` and `retry_count = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn create(&self, input: NewOrder) -> Result<Order, EngineError>;

    /// Looks up an order by ID. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, EngineError>;

    /// Atomically applies a partial update and bumps `updated_at`.
    ///
    /// Status changes are validated against the transition rules:
    /// terminal states are sticky and progress-only statuses are
    /// rejected. `retry_count` may never exceed `max_retries`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OrderNotFound`] if the order does not exist.
    /// - [`EngineError::Conflict`] on a forbidden status transition.
    /// - [`EngineError::Validation`] on a non-persistable status or a
    ///   retry count above `max_retries`.
    /// - [`EngineError::Persistence`] on storage failure (including a
    ///   duplicate `transaction_hash`).
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, EngineError>;

    /// Convenience wrapper around [`OrderStore::update`] for
    /// status-only changes.
    ///
    /// # Errors
    ///
    /// As [`OrderStore::update`].
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, EngineError> {
        self.update(id, OrderUpdate::status(status)).await
    }

    /// Hard-deletes an order. Permitted only while the order is
    /// `pending` and no job has ever been enqueued for it; used to roll
    /// back a failed queue enqueue at creation time.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OrderNotFound`] if absent.
    /// - [`EngineError::Conflict`] if the order left `pending` or has
    ///   been enqueued.
    async fn delete(&self, id: OrderId) -> Result<(), EngineError>;

    /// Records that an execution job has been enqueued for the order,
    /// which permanently disables [`OrderStore::delete`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OrderNotFound`] if absent.
    async fn mark_enqueued(&self, id: OrderId) -> Result<(), EngineError>;

    /// Counts orders matching the filter (pagination ignored).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn count(&self, filter: &OrderFilter) -> Result<u64, EngineError>;

    /// Lists orders matching the filter with pagination and sort.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn find_all(&self, filter: &OrderFilter) -> Result<Vec<Order>, EngineError>;

    /// Appends an audit record.
    ///
    /// Versions are monotonic within an order. With an explicit
    /// `event_version`, appending a duplicate `(order_id, version)` is
    /// an idempotent no-op returning the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, EngineError>;

    /// Loads the audit history for an order, ordered by
    /// `(timestamp, event_version)` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn load_audit(&self, order_id: OrderId) -> Result<Vec<AuditRecord>, EngineError>;
}

/// Validates a partial update against the current order, returning the
/// updated copy. Shared by both store implementations so the transition
/// rules cannot drift.
pub(crate) fn apply_update(
    current: &Order,
    update: &OrderUpdate,
) -> Result<Order, EngineError> {
    let mut next = current.clone();

    if let Some(status) = update.status {
        if !status.is_persistable() {
            return Err(EngineError::Validation(format!(
                "status {status} is progress-only and cannot be persisted"
            )));
        }
        if status != current.status && !current.status.can_transition_to(status) {
            return Err(EngineError::Conflict {
                order_id: current.id,
                status: current.status.to_string(),
                reason: format!("transition to {status}"),
            });
        }
        next.status = status;
    }

    if let Some(retry_count) = update.retry_count {
        if retry_count > current.max_retries {
            return Err(EngineError::Validation(format!(
                "retry count {retry_count} exceeds max retries {}",
                current.max_retries
            )));
        }
        next.retry_count = retry_count;
    }

    if let Some(venue) = &update.selected_venue {
        next.selected_venue = venue.clone();
    }
    if let Some(price) = update.executed_price {
        next.executed_price = price;
    }
    if let Some(hash) = &update.transaction_hash {
        next.transaction_hash = hash.clone();
    }
    if let Some(message) = &update.error_message {
        next.error_message = message.clone();
    }
    if let Some(confirmed_at) = update.confirmed_at {
        next.confirmed_at = confirmed_at;
    }

    next.updated_at = chrono::Utc::now();
    Ok(next)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: dec!(1.0),
            status,
            slippage_tolerance: dec!(0.5),
            max_retries: 3,
            retry_count: 0,
            selected_venue: None,
            executed_price: None,
            transaction_hash: None,
            error_message: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn update_rejects_terminal_transition() {
        let order = make_order(OrderStatus::Completed);
        let result = apply_update(&order, &OrderUpdate::status(OrderStatus::Pending));
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[test]
    fn update_rejects_progress_only_status() {
        let order = make_order(OrderStatus::Processing);
        let result = apply_update(&order, &OrderUpdate::status(OrderStatus::Routing));
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn update_rejects_retry_count_above_max() {
        let order = make_order(OrderStatus::Processing);
        let update = OrderUpdate {
            retry_count: Some(4),
            ..OrderUpdate::default()
        };
        let result = apply_update(&order, &update);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn update_bumps_updated_at() {
        let order = make_order(OrderStatus::Pending);
        let before = order.updated_at;
        let updated = apply_update(&order, &OrderUpdate::status(OrderStatus::Processing));
        let Ok(updated) = updated else {
            panic!("legal transition rejected");
        };
        assert_eq!(updated.status, OrderStatus::Processing);
        assert!(updated.updated_at >= before);
    }

    #[test]
    fn same_status_update_is_allowed() {
        let order = make_order(OrderStatus::Pending);
        let result = apply_update(&order, &OrderUpdate::status(OrderStatus::Pending));
        assert!(result.is_ok());
    }
}
