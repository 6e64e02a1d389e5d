//! Order service: validation, persistence, job enqueue, cancellation.
//!
//! Stateless coordinator in front of the store and the queue. Every
//! mutation follows the pattern: validate → persist → enqueue → emit
//! events. An enqueue failure rolls the freshly created order back so no
//! orphan row survives.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::{AuditBus, OrderEvent};
use crate::domain::{
    DEFAULT_MAX_RETRIES, DEFAULT_SLIPPAGE_TOLERANCE, MAX_RETRIES_CEILING, NewOrder, Order,
    OrderId, OrderStatus,
};
use crate::error::EngineError;
use crate::queue::JobQueue;
use crate::store::{OrderFilter, OrderStore};

/// Untrusted input for creating an order.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Amount of `token_in` to swap.
    pub amount: Decimal,
    /// Slippage tolerance in percent; defaults to 0.5.
    pub slippage_tolerance: Option<Decimal>,
    /// Execution retries; defaults to 3, capped at 10.
    pub max_retries: Option<u32>,
}

/// Coordinates order CRUD with the execution queue.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    queue: Arc<dyn JobQueue>,
    bus: AuditBus,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService").finish()
    }
}

impl OrderService {
    /// Creates the service over its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, queue: Arc<dyn JobQueue>, bus: AuditBus) -> Self {
        Self { store, queue, bus }
    }

    /// Validates the request into a [`NewOrder`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when tokens are empty or
    /// equal, the amount is not positive, slippage is outside 0..=100,
    /// or retries exceed the ceiling.
    pub fn validate(request: &CreateOrderRequest) -> Result<NewOrder, EngineError> {
        let token_in = request.token_in.trim();
        let token_out = request.token_out.trim();
        if token_in.is_empty() || token_out.is_empty() {
            return Err(EngineError::Validation(
                "tokenIn and tokenOut must be non-empty".to_string(),
            ));
        }
        if token_in == token_out {
            return Err(EngineError::Validation(format!(
                "tokenIn and tokenOut must differ (both {token_in})"
            )));
        }
        if request.amount <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let slippage_tolerance = match request.slippage_tolerance {
            Some(slippage) => {
                if slippage < Decimal::ZERO || slippage > Decimal::ONE_HUNDRED {
                    return Err(EngineError::Validation(format!(
                        "slippageTolerance must be within 0..=100, got {slippage}"
                    )));
                }
                slippage
            }
            None => Decimal::from_str(DEFAULT_SLIPPAGE_TOLERANCE)
                .unwrap_or(Decimal::ONE / Decimal::TWO),
        };

        let max_retries = match request.max_retries {
            Some(retries) => {
                if retries > MAX_RETRIES_CEILING {
                    return Err(EngineError::Validation(format!(
                        "maxRetries must be within 0..={MAX_RETRIES_CEILING}, got {retries}"
                    )));
                }
                retries
            }
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(NewOrder {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount: request.amount,
            slippage_tolerance,
            max_retries,
        })
    }

    /// Creates an order, enqueues its execution job, and emits
    /// `order:created` and `queue:job-added`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] on invalid input.
    /// - [`EngineError::ServiceUnavailable`] when the queue refuses the
    ///   job; the order row is rolled back first.
    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, EngineError> {
        let input = Self::validate(&request)?;
        let order = self.store.create(input).await?;

        self.bus
            .emit(OrderEvent::OrderCreated {
                order_id: order.id,
                token_in: order.token_in.clone(),
                token_out: order.token_out.clone(),
                amount: order.amount.to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let job = match self.queue.enqueue(order.id).await {
            Ok(job) => job,
            Err(e) => {
                // No orphan rows: a created order that cannot be queued
                // is removed before the error surfaces.
                if let Err(rollback) = self.store.delete(order.id).await {
                    tracing::error!(order_id = %order.id, error = %rollback,
                        "rollback of unqueued order failed");
                }
                tracing::warn!(order_id = %order.id, error = %e, "enqueue failed");
                return Err(EngineError::ServiceUnavailable(format!(
                    "execution queue rejected the order: {e}"
                )));
            }
        };
        self.store.mark_enqueued(order.id).await?;

        self.bus
            .emit(OrderEvent::JobAdded {
                order_id: order.id,
                job_id: job.job_id,
                timestamp: Utc::now(),
            })
            .await;

        tracing::info!(order_id = %order.id, token_in = %order.token_in,
            token_out = %order.token_out, "order created");
        Ok(order)
    }

    /// Looks up an order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OrderNotFound`] when absent.
    pub async fn get(&self, id: OrderId) -> Result<Order, EngineError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::OrderNotFound(id))
    }

    /// Cancels a non-terminal order. The worker observes the terminal
    /// status at its next transition check and stops.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OrderNotFound`] when absent.
    /// - [`EngineError::Conflict`] when the order is already terminal.
    pub async fn cancel(&self, id: OrderId) -> Result<Order, EngineError> {
        let order = self.get(id).await?;
        if order.is_terminal() {
            return Err(EngineError::Conflict {
                order_id: id,
                status: order.status.to_string(),
                reason: "cancel".to_string(),
            });
        }

        let cancelled = self
            .store
            .update_status(id, OrderStatus::Cancelled)
            .await?;
        self.bus
            .emit(OrderEvent::OrderStatusChanged {
                order_id: id,
                from: order.status,
                to: OrderStatus::Cancelled,
                timestamp: Utc::now(),
            })
            .await;
        tracing::info!(order_id = %id, "order cancelled");
        Ok(cancelled)
    }

    /// Lists orders with the filter, returning the page and the total
    /// count matching the filter (pagination excluded).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    pub async fn list(&self, filter: OrderFilter) -> Result<(Vec<Order>, u64), EngineError> {
        let count_filter = OrderFilter {
            limit: None,
            offset: None,
            ..filter.clone()
        };
        let orders = self.store.find_all(&filter).await?;
        let total = self.store.count(&count_filter).await?;
        Ok((orders, total))
    }

    /// Counts orders matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    pub async fn count(&self, filter: OrderFilter) -> Result<u64, EngineError> {
        self.store.count(&filter).await
    }

    /// Audit history for an order, in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    pub async fn history(
        &self,
        id: OrderId,
    ) -> Result<Vec<crate::audit::AuditRecord>, EngineError> {
        self.store.load_audit(id).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::queue::{MemoryJobQueue, QueueOptions};
    use crate::store::MemoryOrderStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryOrderStore>,
        queue: Arc<MemoryJobQueue>,
        service: OrderService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryOrderStore::new());
        let queue = Arc::new(MemoryJobQueue::new(QueueOptions::default()));
        let mut bus = AuditBus::new();
        bus.register(Arc::new(crate::audit::AuditLogListener::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
        )));
        let service = OrderService::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            bus,
        );
        Fixture {
            store,
            queue,
            service,
        }
    }

    fn make_request() -> CreateOrderRequest {
        CreateOrderRequest {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: dec!(1.0),
            slippage_tolerance: Some(dec!(1.0)),
            max_retries: Some(3),
        }
    }

    #[tokio::test]
    async fn create_persists_and_enqueues() {
        let fx = fixture();
        let order = fx.service.create(make_request()).await;
        let Ok(order) = order else {
            panic!("create failed");
        };
        assert_eq!(order.status, OrderStatus::Pending);

        let stats = fx.queue.stats().await;
        assert_eq!(stats.enqueued_total, 1);

        let audit = fx.store.load_audit(order.id).await.unwrap_or_default();
        assert_eq!(audit.first().map(|r| r.event_type.as_str()), Some("order:created"));
        assert!(audit.iter().any(|r| r.event_type == "queue:job-added"));
    }

    #[tokio::test]
    async fn equal_tokens_are_rejected() {
        let fx = fixture();
        let mut request = make_request();
        request.token_out = "SOL".to_string();
        let result = fx.service.create(request).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let fx = fixture();
        let mut request = make_request();
        request.amount = dec!(0);
        assert!(matches!(
            fx.service.create(request).await,
            Err(EngineError::Validation(_))
        ));

        let mut negative = make_request();
        negative.amount = dec!(-1);
        assert!(matches!(
            fx.service.create(negative).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn slippage_and_retry_bounds_are_enforced() {
        let fx = fixture();
        let mut request = make_request();
        request.slippage_tolerance = Some(dec!(101));
        assert!(matches!(
            fx.service.create(request).await,
            Err(EngineError::Validation(_))
        ));

        let mut retries = make_request();
        retries.max_retries = Some(11);
        assert!(matches!(
            fx.service.create(retries).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn defaults_apply_when_omitted() {
        let fx = fixture();
        let request = CreateOrderRequest {
            slippage_tolerance: None,
            max_retries: None,
            ..make_request()
        };
        let order = fx.service.create(request).await;
        let Ok(order) = order else {
            panic!("create failed");
        };
        assert_eq!(order.slippage_tolerance, dec!(0.5));
        assert_eq!(order.max_retries, 3);
    }

    #[tokio::test]
    async fn cancel_pending_order_is_terminal() {
        let fx = fixture();
        let Ok(order) = fx.service.create(make_request()).await else {
            panic!("create failed");
        };
        let cancelled = fx.service.cancel(order.id).await;
        let Ok(cancelled) = cancelled else {
            panic!("cancel failed");
        };
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // Cancelling again conflicts: terminal states are sticky.
        let again = fx.service.cancel(order.id).await;
        assert!(matches!(again, Err(EngineError::Conflict { .. })));
    }

    /// Queue stub whose enqueue always fails.
    struct DownQueue;

    #[async_trait::async_trait]
    impl JobQueue for DownQueue {
        async fn enqueue(
            &self,
            _order_id: crate::domain::OrderId,
        ) -> Result<crate::queue::ExecutionJob, EngineError> {
            Err(EngineError::Queue("connection refused".to_string()))
        }

        async fn lease(
            &self,
            _timeout: Duration,
        ) -> Result<Option<crate::queue::LeasedJob>, EngineError> {
            Ok(None)
        }

        async fn ack(&self, _lease: &crate::queue::LeasedJob) -> Result<(), EngineError> {
            Ok(())
        }

        async fn nack(
            &self,
            _lease: &crate::queue::LeasedJob,
            _error: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn stats(&self) -> crate::queue::QueueStats {
            crate::queue::QueueStats::default()
        }

        async fn dead_letters(&self) -> Vec<crate::queue::DeadJob> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn enqueue_failure_rolls_back_the_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = OrderService::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::new(DownQueue),
            AuditBus::new(),
        );

        let result = service.create(make_request()).await;
        assert!(matches!(result, Err(EngineError::ServiceUnavailable(_))));

        // No orphan order row survives the failed enqueue.
        let filter = OrderFilter::default();
        assert_eq!(store.count(&filter).await.ok(), Some(0));
    }

    #[tokio::test]
    async fn list_returns_page_and_total() {
        let fx = fixture();
        for _ in 0..4 {
            let Ok(_order) = fx.service.create(make_request()).await else {
                panic!("create failed");
            };
        }

        let filter = OrderFilter {
            limit: Some(2),
            ..OrderFilter::default()
        };
        let listed = fx.service.list(filter).await;
        let Ok((page, total)) = listed else {
            panic!("list failed");
        };
        assert_eq!(page.len(), 2);
        assert_eq!(total, 4);
    }
}
