//! The per-order execution state machine.
//!
//! For each leased job the orchestrator drives one order through
//! validate → quote → route → swap → confirm → finalize, emitting audit
//! events and push notifications at every transition. Errors are
//! classified as retriable (network, venue down, no quotes, slippage,
//! protocol) or terminal (missing order, invalid input, terminal state);
//! retriable failures are written back as a `pending` retry and nacked,
//! terminal failures ack immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::audit::{AuditBus, OrderEvent};
use crate::domain::{Order, OrderId, OrderStatus, OrderUpdate, SwapStatus};
use crate::error::EngineError;
use crate::notify::NotificationHub;
use crate::queue::ExecutionJob;
use crate::store::OrderStore;
use crate::venue::{VenueError, VenueRegistry};

/// Default deadline for one venue swap submission.
pub const DEFAULT_SWAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between confirmation polls.
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(1);

/// Default total budget for confirmation polling.
pub const DEFAULT_CONFIRM_BUDGET: Duration = Duration::from_secs(60);

/// How the worker must settle the lease after an execution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// Settle with `ack`: the order reached a terminal decision (or the
    /// delivery was an idempotent no-op).
    Ack,
    /// Settle with `nack(error)`: a retriable failure; the queue applies
    /// backoff and redelivers.
    Retry(String),
}

/// Drives the execution pipeline for leased jobs.
pub struct Orchestrator {
    store: Arc<dyn OrderStore>,
    registry: Arc<VenueRegistry>,
    hub: Arc<NotificationHub>,
    bus: AuditBus,
    wallet_address: String,
    swap_timeout: Duration,
    confirm_interval: Duration,
    confirm_budget: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("swap_timeout", &self.swap_timeout)
            .finish()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over the given collaborators. The wallet
    /// is injected here, never read from process state mid-execution.
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<VenueRegistry>,
        hub: Arc<NotificationHub>,
        bus: AuditBus,
        wallet_address: String,
    ) -> Self {
        Self {
            store,
            registry,
            hub,
            bus,
            wallet_address,
            swap_timeout: DEFAULT_SWAP_TIMEOUT,
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
            confirm_budget: DEFAULT_CONFIRM_BUDGET,
        }
    }

    /// Overrides the per-venue swap deadline.
    #[must_use]
    pub fn with_swap_timeout(mut self, timeout: Duration) -> Self {
        self.swap_timeout = timeout;
        self
    }

    /// Overrides the confirmation polling cadence.
    #[must_use]
    pub fn with_confirmation(mut self, interval: Duration, budget: Duration) -> Self {
        self.confirm_interval = interval;
        self.confirm_budget = budget;
        self
    }

    /// Runs one order through the pipeline. Never panics and never
    /// returns an error: every failure is folded into the disposition.
    pub async fn execute(&self, job: &ExecutionJob) -> JobDisposition {
        let order_id = job.order_id;

        // Step 1: load & validate. At-least-once delivery means this job
        // may be a replay; refuse terminal orders before touching state.
        let order = match self.store.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(%order_id, "job references a missing order");
                self.bus
                    .emit(OrderEvent::SystemError {
                        order_id: Some(order_id),
                        message: "execution job references a missing order".to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                return JobDisposition::Ack;
            }
            Err(e) => return JobDisposition::Retry(format!("order load failed: {e}")),
        };

        if order.is_terminal() {
            tracing::debug!(%order_id, status = %order.status, "redelivery of terminal order");
            return JobDisposition::Ack;
        }

        if order.amount <= Decimal::ZERO || order.token_in == order.token_out {
            return self.fail_terminal_invalid(&order).await;
        }

        // Step 2: enter processing.
        let previous_status = order.status;
        match self
            .store
            .update_status(order_id, OrderStatus::Processing)
            .await
        {
            Ok(_) => {}
            Err(EngineError::Conflict { .. }) => {
                // Lost a race with a cancellation; the order is terminal.
                tracing::debug!(%order_id, "order reached terminal state before processing");
                return JobDisposition::Ack;
            }
            Err(e) => return JobDisposition::Retry(format!("status update failed: {e}")),
        }
        self.bus
            .emit(OrderEvent::OrderStatusChanged {
                order_id,
                from: previous_status,
                to: OrderStatus::Processing,
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::ExecutionStarted {
                order_id,
                attempt: job.attempt,
                timestamp: Utc::now(),
            })
            .await;
        self.report_progress(order_id, 10);
        self.hub
            .push_order_update(
                order_id,
                OrderStatus::Processing,
                serde_json::json!({ "progress": 10, "attempt": job.attempt }),
            )
            .await;

        // Step 3: quote fan-out.
        let best = match self
            .registry
            .get_best_quote(
                &order.token_in,
                &order.token_out,
                order.amount,
                order.slippage_tolerance,
            )
            .await
        {
            Ok(best) => {
                self.bus
                    .emit(OrderEvent::QuotesFetched {
                        order_id,
                        quote_count: best.ranked.len(),
                        failures: best
                            .failures
                            .iter()
                            .map(|(venue, error)| format!("{venue}: {error}"))
                            .collect(),
                        timestamp: Utc::now(),
                    })
                    .await;
                best
            }
            Err(e) => {
                self.bus
                    .emit(OrderEvent::QuotesFetched {
                        order_id,
                        quote_count: 0,
                        failures: vec![e.to_string()],
                        timestamp: Utc::now(),
                    })
                    .await;
                return self.fail_attempt(order_id, e.to_string()).await;
            }
        };
        let quote = best.best;
        let venue_name = quote.venue_name.clone();

        // Step 4: select. Routing is a progress-only state: emitted and
        // pushed, but the persisted status stays `processing`.
        if let Some(disposition) = self.bail_if_terminal(order_id).await {
            return disposition;
        }
        self.bus
            .emit(OrderEvent::DexSelected {
                order_id,
                venue: venue_name.clone(),
                quote: quote.clone(),
                timestamp: Utc::now(),
            })
            .await;
        self.report_progress(order_id, 40);
        self.hub
            .push_order_update(
                order_id,
                OrderStatus::Routing,
                serde_json::json!({
                    "progress": 40,
                    "venue": venue_name,
                    "expectedAmountOut": quote.amount_out,
                }),
            )
            .await;

        // Step 5: swap through the selected venue.
        if let Some(disposition) = self.bail_if_terminal(order_id).await {
            return disposition;
        }
        self.bus
            .emit(OrderEvent::SwapSubmitted {
                order_id,
                venue: venue_name.clone(),
                timestamp: Utc::now(),
            })
            .await;
        self.report_progress(order_id, 70);

        let Some(adapter) = self.registry.adapter(&venue_name) else {
            return self
                .fail_attempt(order_id, format!("venue {venue_name} disappeared"))
                .await;
        };
        let swap = match tokio::time::timeout(
            self.swap_timeout,
            adapter.execute_swap(&quote, &self.wallet_address),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                // Every venue error (slippage included) may clear on a
                // retry against fresh quotes.
                return self.fail_attempt(order_id, e.to_string()).await;
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.swap_timeout.as_millis()).unwrap_or(u64::MAX);
                return self
                    .fail_attempt(
                        order_id,
                        VenueError::Timeout {
                            venue: venue_name,
                            timeout_ms,
                        }
                        .to_string(),
                    )
                    .await;
            }
        };

        // Confirmation: poll until the venue reports a final status.
        let confirmed = match swap.status {
            SwapStatus::Completed => true,
            SwapStatus::Failed => false,
            SwapStatus::Pending => {
                match self.await_confirmation(&venue_name, &swap.signature).await {
                    Ok(confirmed) => confirmed,
                    Err(e) => return self.fail_attempt(order_id, e).await,
                }
            }
        };
        if !confirmed {
            return self
                .fail_attempt(
                    order_id,
                    format!("swap {} failed on {}", swap.signature, swap.venue_name),
                )
                .await;
        }

        // Step 6: finalize success atomically.
        let update = OrderUpdate {
            status: Some(OrderStatus::Completed),
            selected_venue: Some(Some(swap.venue_name.clone())),
            executed_price: Some(Some(swap.execution_price)),
            transaction_hash: Some(Some(swap.signature.clone())),
            confirmed_at: Some(Some(Utc::now())),
            error_message: Some(None),
            ..OrderUpdate::default()
        };
        match self.store.update(order_id, update).await {
            Ok(_) => {}
            Err(EngineError::Conflict { .. }) => {
                // Cancelled between swap and finalize; the swap happened
                // but the order is terminal, so just settle the job.
                tracing::warn!(%order_id, signature = %swap.signature,
                    "order reached terminal state after swap; finalize skipped");
                return JobDisposition::Ack;
            }
            Err(e) => return JobDisposition::Retry(format!("finalize failed: {e}")),
        }

        self.bus
            .emit(OrderEvent::OrderStatusChanged {
                order_id,
                from: OrderStatus::Processing,
                to: OrderStatus::Completed,
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::SwapConfirmed {
                order_id,
                signature: swap.signature.clone(),
                amount_out: swap.amount_out.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::OrderConfirmed {
                order_id,
                venue: swap.venue_name.clone(),
                transaction_hash: swap.signature.clone(),
                executed_price: swap.execution_price.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        self.report_progress(order_id, 100);
        self.hub
            .push_order_update(
                order_id,
                OrderStatus::Completed,
                serde_json::json!({
                    "progress": 100,
                    "transactionHash": swap.signature,
                    "venue": swap.venue_name,
                    "amountOut": swap.amount_out,
                    "executedPrice": swap.execution_price,
                }),
            )
            .await;

        tracing::info!(%order_id, venue = %swap.venue_name, signature = %swap.signature,
            "order completed");
        JobDisposition::Ack
    }

    /// Step 7: retry decision for a retriable attempt failure.
    async fn fail_attempt(&self, order_id: OrderId, error: String) -> JobDisposition {
        let order = match self.store.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return JobDisposition::Ack,
            Err(e) => return JobDisposition::Retry(format!("order reload failed: {e}")),
        };
        if order.is_terminal() {
            // Cancelled (or otherwise settled) while the attempt ran.
            return JobDisposition::Ack;
        }

        if order.retry_count < order.max_retries {
            let retry_count = order.retry_count + 1;
            let attempts_left = order.max_retries - retry_count;
            let update = OrderUpdate {
                status: Some(OrderStatus::Pending),
                retry_count: Some(retry_count),
                error_message: Some(Some(error.clone())),
                ..OrderUpdate::default()
            };
            match self.store.update(order_id, update).await {
                Ok(_) => {}
                Err(EngineError::Conflict { .. }) => return JobDisposition::Ack,
                Err(e) => return JobDisposition::Retry(format!("retry write failed: {e}")),
            }
            self.bus
                .emit(OrderEvent::OrderStatusChanged {
                    order_id,
                    from: order.status,
                    to: OrderStatus::Pending,
                    timestamp: Utc::now(),
                })
                .await;
            self.bus
                .emit(OrderEvent::ExecutionRetrying {
                    order_id,
                    retry_count,
                    attempts_left,
                    error: error.clone(),
                    timestamp: Utc::now(),
                })
                .await;
            self.hub
                .push_order_update(
                    order_id,
                    OrderStatus::Failed,
                    serde_json::json!({ "error": error, "attemptsLeft": attempts_left }),
                )
                .await;
            tracing::info!(%order_id, retry_count, error = %error, "attempt failed, retrying");
            return JobDisposition::Retry(error);
        }

        // Retries exhausted: terminal failure.
        let terminal_error = format!(
            "max retries ({}) exhausted; last error: {error}",
            order.max_retries
        );
        let update = OrderUpdate {
            status: Some(OrderStatus::Failed),
            error_message: Some(Some(terminal_error.clone())),
            ..OrderUpdate::default()
        };
        match self.store.update(order_id, update).await {
            Ok(_) => {}
            Err(EngineError::Conflict { .. }) => return JobDisposition::Ack,
            Err(e) => return JobDisposition::Retry(format!("terminal write failed: {e}")),
        }
        self.bus
            .emit(OrderEvent::ExecutionRetrying {
                order_id,
                retry_count: order.retry_count,
                attempts_left: 0,
                error: error.clone(),
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::OrderStatusChanged {
                order_id,
                from: order.status,
                to: OrderStatus::Failed,
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::OrderFailed {
                order_id,
                error: terminal_error.clone(),
                retry_count: order.retry_count,
                timestamp: Utc::now(),
            })
            .await;
        self.hub
            .push_order_update(
                order_id,
                OrderStatus::Failed,
                serde_json::json!({ "error": terminal_error, "attemptsLeft": 0 }),
            )
            .await;
        tracing::warn!(%order_id, error = %terminal_error, "order failed terminally");
        JobDisposition::Ack
    }

    /// Terminal failure for invalid order input (amount ≤ 0 or equal
    /// tokens): no retry regardless of the retry budget.
    async fn fail_terminal_invalid(&self, order: &Order) -> JobDisposition {
        let order_id = order.id;
        let error = if order.amount <= Decimal::ZERO {
            format!("invalid amount {}", order.amount)
        } else {
            format!("tokenIn equals tokenOut ({})", order.token_in)
        };
        let update = OrderUpdate {
            status: Some(OrderStatus::Failed),
            error_message: Some(Some(error.clone())),
            ..OrderUpdate::default()
        };
        match self.store.update(order_id, update).await {
            Ok(_) => {}
            Err(EngineError::Conflict { .. }) => return JobDisposition::Ack,
            Err(e) => return JobDisposition::Retry(format!("terminal write failed: {e}")),
        }
        self.bus
            .emit(OrderEvent::ExecutionFailed {
                order_id,
                error: error.clone(),
                attempt: 1,
                timestamp: Utc::now(),
            })
            .await;
        self.bus
            .emit(OrderEvent::OrderFailed {
                order_id,
                error: error.clone(),
                retry_count: order.retry_count,
                timestamp: Utc::now(),
            })
            .await;
        self.hub
            .push_order_update(
                order_id,
                OrderStatus::Failed,
                serde_json::json!({ "error": error, "attemptsLeft": 0 }),
            )
            .await;
        JobDisposition::Ack
    }

    /// Re-reads the order before a transition; a terminal observation
    /// (user cancellation) converts into an immediate ack.
    async fn bail_if_terminal(&self, order_id: OrderId) -> Option<JobDisposition> {
        match self.store.find_by_id(order_id).await {
            Ok(Some(order)) if order.is_terminal() => {
                tracing::info!(%order_id, status = %order.status,
                    "order settled mid-pipeline; stopping");
                Some(JobDisposition::Ack)
            }
            Ok(Some(_)) => None,
            Ok(None) => Some(JobDisposition::Ack),
            Err(e) => Some(JobDisposition::Retry(format!("order reload failed: {e}"))),
        }
    }

    /// Polls the venue for the transaction's final status.
    ///
    /// Returns `Ok(true)` on confirmation, `Ok(false)` when the venue
    /// reports failure, and `Err` when the budget runs out (retriable).
    async fn await_confirmation(&self, venue: &str, signature: &str) -> Result<bool, String> {
        let Some(adapter) = self.registry.adapter(venue) else {
            return Err(format!("venue {venue} disappeared during confirmation"));
        };
        let deadline = tokio::time::Instant::now() + self.confirm_budget;
        loop {
            match adapter.get_transaction_status(signature).await {
                Ok(SwapStatus::Completed) => return Ok(true),
                Ok(SwapStatus::Failed) => return Ok(false),
                Ok(SwapStatus::Pending) => {}
                Err(e) => {
                    tracing::debug!(venue, signature, error = %e, "confirmation poll failed");
                }
            }
            if tokio::time::Instant::now() + self.confirm_interval > deadline {
                return Err(format!(
                    "confirmation of {signature} on {venue} timed out"
                ));
            }
            tokio::time::sleep(self.confirm_interval).await;
        }
    }

    /// Best-effort progress report; never fails the pipeline.
    fn report_progress(&self, order_id: OrderId, percent: u8) {
        tracing::debug!(%order_id, percent, "execution progress");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::NewOrder;
    use crate::store::MemoryOrderStore;
    use crate::venue::{MockVenue, VenueAdapter};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryOrderStore>,
        hub: Arc<NotificationHub>,
        orchestrator: Orchestrator,
    }

    fn fixture(venues: Vec<MockVenue>) -> Fixture {
        let store = Arc::new(MemoryOrderStore::new());
        let registry = Arc::new(VenueRegistry::new(
            venues
                .into_iter()
                .map(|v| Arc::new(v) as Arc<dyn VenueAdapter>)
                .collect(),
        ));
        let hub = Arc::new(NotificationHub::new());
        let mut bus = AuditBus::new();
        bus.register(Arc::new(crate::audit::AuditLogListener::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
        )));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            registry,
            Arc::clone(&hub),
            bus,
            "wallet-test".to_string(),
        );
        Fixture {
            store,
            hub,
            orchestrator,
        }
    }

    fn make_input() -> NewOrder {
        NewOrder {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: dec!(1.0),
            slippage_tolerance: dec!(1.0),
            max_retries: 3,
        }
    }

    async fn create_order(fx: &Fixture, input: NewOrder) -> Order {
        let order = fx.store.create(input).await;
        let Ok(order) = order else {
            panic!("create failed");
        };
        order
    }

    #[tokio::test]
    async fn happy_path_completes_with_best_venue() {
        let fx = fixture(vec![
            MockVenue::new("raydium", dec!(95.5)),
            MockVenue::new("meteora", dec!(96.2)),
        ]);
        let order = create_order(&fx, make_input()).await;
        let job = ExecutionJob::new(order.id);

        let disposition = fx.orchestrator.execute(&job).await;
        assert_eq!(disposition, JobDisposition::Ack);

        let Ok(Some(done)) = fx.store.find_by_id(order.id).await else {
            panic!("order vanished");
        };
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.selected_venue.as_deref(), Some("meteora"));
        assert!(done.transaction_hash.is_some());
        assert!(done.confirmed_at.is_some());
        assert!(done.executed_price.unwrap_or_default() > Decimal::ZERO);
    }

    #[tokio::test]
    async fn redelivery_of_completed_order_is_noop() {
        let fx = fixture(vec![MockVenue::new("meteora", dec!(96.2))]);
        let order = create_order(&fx, make_input()).await;
        let job = ExecutionJob::new(order.id);

        let first = fx.orchestrator.execute(&job).await;
        assert_eq!(first, JobDisposition::Ack);
        let audit_before = fx.store.load_audit(order.id).await.unwrap_or_default();

        // Same job delivered again.
        let second = fx.orchestrator.execute(&job).await;
        assert_eq!(second, JobDisposition::Ack);

        let audit_after = fx.store.load_audit(order.id).await.unwrap_or_default();
        assert_eq!(audit_before.len(), audit_after.len());
    }

    #[tokio::test]
    async fn slippage_failure_retries_then_succeeds() {
        let venue = MockVenue::new("meteora", dec!(96.2));
        venue.push_swap_output(dec!(94.0)).await; // below the 1% floor
        let fx = fixture(vec![venue]);
        let order = create_order(&fx, make_input()).await;

        let first = fx.orchestrator.execute(&ExecutionJob::new(order.id)).await;
        assert!(matches!(first, JobDisposition::Retry(_)));

        let Ok(Some(mid)) = fx.store.find_by_id(order.id).await else {
            panic!("order vanished");
        };
        assert_eq!(mid.status, OrderStatus::Pending);
        assert_eq!(mid.retry_count, 1);
        assert!(mid.error_message.unwrap_or_default().contains("slippage"));

        let mut retry_job = ExecutionJob::new(order.id);
        retry_job.attempt = 2;
        let second = fx.orchestrator.execute(&retry_job).await;
        assert_eq!(second, JobDisposition::Ack);

        let Ok(Some(done)) = fx.store.find_by_id(order.id).await else {
            panic!("order vanished");
        };
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.retry_count, 1);
    }

    #[tokio::test]
    async fn all_venues_down_exhausts_retries() {
        let a = MockVenue::new("raydium", dec!(95.5));
        let b = MockVenue::new("meteora", dec!(96.2));
        a.set_enabled(false);
        b.set_enabled(false);
        let fx = fixture(vec![a, b]);
        let mut input = make_input();
        input.max_retries = 2;
        let order = create_order(&fx, input).await;

        for attempt in 1..=2u32 {
            let mut job = ExecutionJob::new(order.id);
            job.attempt = attempt;
            let disposition = fx.orchestrator.execute(&job).await;
            assert!(matches!(disposition, JobDisposition::Retry(_)));
        }
        let mut last = ExecutionJob::new(order.id);
        last.attempt = 3;
        let final_disposition = fx.orchestrator.execute(&last).await;
        assert_eq!(final_disposition, JobDisposition::Ack);

        let Ok(Some(done)) = fx.store.find_by_id(order.id).await else {
            panic!("order vanished");
        };
        assert_eq!(done.status, OrderStatus::Failed);
        assert_eq!(done.retry_count, 2);
        assert!(
            done.error_message
                .unwrap_or_default()
                .contains("max retries")
        );

        let audit = fx.store.load_audit(order.id).await.unwrap_or_default();
        let retrying = audit
            .iter()
            .filter(|r| r.event_type == "execution:retrying")
            .count();
        let failed = audit
            .iter()
            .filter(|r| r.event_type == "order:failed")
            .count();
        assert_eq!(retrying, 3);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn cancelled_order_acks_without_swap() {
        let venue = MockVenue::new("meteora", dec!(96.2));
        let fx = fixture(vec![venue]);
        let order = create_order(&fx, make_input()).await;
        let _ = fx
            .store
            .update_status(order.id, OrderStatus::Cancelled)
            .await;

        let disposition = fx.orchestrator.execute(&ExecutionJob::new(order.id)).await;
        assert_eq!(disposition, JobDisposition::Ack);

        let audit = fx.store.load_audit(order.id).await.unwrap_or_default();
        assert!(
            audit
                .iter()
                .all(|r| r.event_type != "execution:swap-submitted")
        );
    }

    #[tokio::test]
    async fn invalid_amount_fails_terminally_without_retry() {
        let fx = fixture(vec![MockVenue::new("meteora", dec!(96.2))]);
        // Bypass service validation: write an invalid order directly.
        let mut input = make_input();
        input.amount = dec!(0);
        let order = create_order(&fx, input).await;

        let disposition = fx.orchestrator.execute(&ExecutionJob::new(order.id)).await;
        assert_eq!(disposition, JobDisposition::Ack);

        let Ok(Some(done)) = fx.store.find_by_id(order.id).await else {
            panic!("order vanished");
        };
        assert_eq!(done.status, OrderStatus::Failed);
        assert_eq!(done.retry_count, 0);
    }

    #[tokio::test]
    async fn missing_order_acks_with_system_error() {
        let fx = fixture(vec![MockVenue::new("meteora", dec!(96.2))]);
        let disposition = fx
            .orchestrator
            .execute(&ExecutionJob::new(OrderId::new()))
            .await;
        assert_eq!(disposition, JobDisposition::Ack);
    }

    #[tokio::test]
    async fn pushes_arrive_in_pipeline_order() {
        let fx = fixture(vec![MockVenue::new("meteora", dec!(96.2))]);
        let order = create_order(&fx, make_input()).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        fx.hub
            .register(
                order.id,
                crate::notify::Subscriber::new(uuid::Uuid::new_v4(), tx),
            )
            .await;

        let _ = fx.orchestrator.execute(&ExecutionJob::new(order.id)).await;

        let mut statuses = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap_or_default();
            if let Some(status) = value.get("status").and_then(|s| s.as_str()) {
                statuses.push(status.to_string());
            }
        }
        assert_eq!(statuses, vec!["processing", "routing", "completed"]);
    }
}
