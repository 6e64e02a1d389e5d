//! In-memory order store with per-order fine-grained locking.
//!
//! [`MemoryOrderStore`] stores orders in a `HashMap` where each entry is
//! individually protected by a [`tokio::sync::RwLock`]. Reads on the same
//! order are concurrent, writes to different orders are concurrent, and
//! writes to the same order are serialized, matching the guarantees the
//! PostgreSQL implementation gets from row-level locks. Doubles as the
//! test fixture for the execution pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::{OrderFilter, OrderSort, apply_update};
use crate::audit::{AuditRecord, NewAuditRecord};
use crate::domain::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate};
use crate::error::EngineError;
use crate::store::OrderStore;

/// One stored order plus the enqueue flag that gates hard deletes.
#[derive(Debug)]
struct OrderRow {
    order: Order,
    ever_enqueued: bool,
}

/// Volatile [`OrderStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Arc<RwLock<OrderRow>>>>,
    audit: RwLock<HashMap<OrderId, Vec<AuditRecord>>>,
    tx_hashes: Mutex<HashSet<String>>,
    audit_seq: AtomicI64,
}

impl MemoryOrderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, id: OrderId) -> Result<Arc<RwLock<OrderRow>>, EngineError> {
        let map = self.orders.read().await;
        map.get(&id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(id))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, input: NewOrder) -> Result<Order, EngineError> {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            token_in: input.token_in,
            token_out: input.token_out,
            amount: input.amount,
            status: OrderStatus::Pending,
            slippage_tolerance: input.slippage_tolerance,
            max_retries: input.max_retries,
            retry_count: 0,
            selected_venue: None,
            executed_price: None,
            transaction_hash: None,
            error_message: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut map = self.orders.write().await;
        map.insert(
            order.id,
            Arc::new(RwLock::new(OrderRow {
                order: order.clone(),
                ever_enqueued: false,
            })),
        );
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        let map = self.orders.read().await;
        match map.get(&id) {
            Some(row) => Ok(Some(row.read().await.order.clone())),
            None => Ok(None),
        }
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, EngineError> {
        let row_lock = self.row(id).await?;
        let mut row = row_lock.write().await;

        let next = apply_update(&row.order, &update)?;

        // Enforce transaction hash uniqueness across the store before
        // committing the row.
        if let Some(Some(hash)) = &update.transaction_hash
            && row.order.transaction_hash.as_deref() != Some(hash.as_str())
        {
            let mut hashes = self.tx_hashes.lock().await;
            if !hashes.insert(hash.clone()) {
                return Err(EngineError::Persistence(format!(
                    "duplicate transaction hash {hash}"
                )));
            }
        }

        row.order = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: OrderId) -> Result<(), EngineError> {
        let row_lock = self.row(id).await?;
        {
            let row = row_lock.read().await;
            if row.order.status != OrderStatus::Pending || row.ever_enqueued {
                return Err(EngineError::Conflict {
                    order_id: id,
                    status: row.order.status.to_string(),
                    reason: "delete is only permitted for never-enqueued pending orders"
                        .to_string(),
                });
            }
        }
        let mut map = self.orders.write().await;
        map.remove(&id);
        Ok(())
    }

    async fn mark_enqueued(&self, id: OrderId) -> Result<(), EngineError> {
        let row_lock = self.row(id).await?;
        let mut row = row_lock.write().await;
        row.ever_enqueued = true;
        Ok(())
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64, EngineError> {
        let map = self.orders.read().await;
        let mut count = 0u64;
        for row in map.values() {
            if filter.matches(&row.read().await.order) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_all(&self, filter: &OrderFilter) -> Result<Vec<Order>, EngineError> {
        let map = self.orders.read().await;
        let mut matched = Vec::new();
        for row in map.values() {
            let order = row.read().await.order.clone();
            if filter.matches(&order) {
                matched.push(order);
            }
        }
        match filter.sort {
            OrderSort::CreatedAtDesc => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            OrderSort::CreatedAtAsc => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
        let offset = filter.offset.unwrap_or(0) as usize;
        let matched: Vec<Order> = matched.into_iter().skip(offset).collect();
        let matched = match filter.limit {
            Some(limit) => matched.into_iter().take(limit as usize).collect(),
            None => matched,
        };
        Ok(matched)
    }

    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, EngineError> {
        let mut audit = self.audit.write().await;
        let records = audit.entry(record.order_id).or_default();

        if let Some(version) = record.event_version
            && let Some(existing) = records.iter().find(|r| r.event_version == version)
        {
            // Idempotent replay of an already-appended version.
            return Ok(existing.clone());
        }

        let version = record.event_version.unwrap_or_else(|| {
            records.iter().map(|r| r.event_version).max().unwrap_or(0) + 1
        });
        let stored = AuditRecord {
            id: self.audit_seq.fetch_add(1, Ordering::SeqCst) + 1,
            order_id: record.order_id,
            event_type: record.event_type,
            event_data: record.event_data,
            event_version: version,
            timestamp: record.timestamp,
            metadata: record.metadata,
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn load_audit(&self, order_id: OrderId) -> Result<Vec<AuditRecord>, EngineError> {
        let audit = self.audit.read().await;
        let mut records = audit.get(&order_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.event_version.cmp(&b.event_version))
        });
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_input() -> NewOrder {
        NewOrder {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: dec!(1.0),
            slippage_tolerance: dec!(0.5),
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_zero_retries() {
        let store = MemoryOrderStore::new();
        let order = store.create(make_input()).await;
        let Ok(order) = order else {
            panic!("create failed");
        };
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.retry_count, 0);

        let found = store.find_by_id(order.id).await;
        assert!(matches!(found, Ok(Some(_))));
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let store = MemoryOrderStore::new();
        let found = store.find_by_id(OrderId::new()).await;
        assert!(matches!(found, Ok(None)));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = MemoryOrderStore::new();
        let result = store
            .update(OrderId::new(), OrderUpdate::status(OrderStatus::Processing))
            .await;
        assert!(matches!(result, Err(EngineError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn update_status_rejects_completed_to_pending() {
        let store = MemoryOrderStore::new();
        let Ok(order) = store.create(make_input()).await else {
            panic!("create failed");
        };
        let _ = store
            .update_status(order.id, OrderStatus::Processing)
            .await;
        let update = OrderUpdate {
            status: Some(OrderStatus::Completed),
            selected_venue: Some(Some("meteora".to_string())),
            executed_price: Some(Some(dec!(96.2))),
            transaction_hash: Some(Some("sig-1".to_string())),
            confirmed_at: Some(Some(Utc::now())),
            ..OrderUpdate::default()
        };
        assert!(store.update(order.id, update).await.is_ok());

        let result = store.update_status(order.id, OrderStatus::Pending).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn duplicate_transaction_hash_is_rejected() {
        let store = MemoryOrderStore::new();
        let Ok(first) = store.create(make_input()).await else {
            panic!("create failed");
        };
        let Ok(second) = store.create(make_input()).await else {
            panic!("create failed");
        };

        let set_hash = |hash: &str| OrderUpdate {
            transaction_hash: Some(Some(hash.to_string())),
            ..OrderUpdate::default()
        };
        assert!(store.update(first.id, set_hash("sig-dup")).await.is_ok());
        let result = store.update(second.id, set_hash("sig-dup")).await;
        assert!(matches!(result, Err(EngineError::Persistence(_))));
    }

    #[tokio::test]
    async fn delete_only_before_enqueue() {
        let store = MemoryOrderStore::new();
        let Ok(order) = store.create(make_input()).await else {
            panic!("create failed");
        };
        let Ok(enqueued) = store.create(make_input()).await else {
            panic!("create failed");
        };

        assert!(store.delete(order.id).await.is_ok());
        assert!(matches!(store.find_by_id(order.id).await, Ok(None)));

        assert!(store.mark_enqueued(enqueued.id).await.is_ok());
        let result = store.delete(enqueued.id).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn filter_and_pagination() {
        let store = MemoryOrderStore::new();
        for _ in 0..5 {
            let _ = store.create(make_input()).await;
        }
        let mut other = make_input();
        other.token_in = "BONK".to_string();
        let _ = store.create(other).await;

        let filter = OrderFilter {
            token_in: Some("SOL".to_string()),
            ..OrderFilter::default()
        };
        assert_eq!(store.count(&filter).await.ok(), Some(5));

        let page = OrderFilter {
            token_in: Some("SOL".to_string()),
            limit: Some(2),
            offset: Some(4),
            ..OrderFilter::default()
        };
        let listed = store.find_all(&page).await;
        let Ok(listed) = listed else {
            panic!("list failed");
        };
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn audit_versions_are_monotonic_and_idempotent() {
        let store = MemoryOrderStore::new();
        let order_id = OrderId::new();

        let first = store
            .append_audit(NewAuditRecord::auto(
                order_id,
                "order:created",
                serde_json::json!({}),
            ))
            .await;
        let Ok(first) = first else {
            panic!("append failed");
        };
        assert_eq!(first.event_version, 1);

        let second = store
            .append_audit(NewAuditRecord::auto(
                order_id,
                "execution:started",
                serde_json::json!({}),
            ))
            .await;
        let Ok(second) = second else {
            panic!("append failed");
        };
        assert_eq!(second.event_version, 2);

        // Replaying version 2 is a no-op returning the stored record.
        let replay = store
            .append_audit(NewAuditRecord {
                event_version: Some(2),
                ..NewAuditRecord::auto(order_id, "execution:started", serde_json::json!({}))
            })
            .await;
        let Ok(replay) = replay else {
            panic!("replay failed");
        };
        assert_eq!(replay.id, second.id);

        let history = store.load_audit(order_id).await;
        let Ok(history) = history else {
            panic!("load failed");
        };
        assert_eq!(history.len(), 2);
        assert!(history.windows(2).all(|w| w[0].event_version < w[1].event_version));
    }
}
