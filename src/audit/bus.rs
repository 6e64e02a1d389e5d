//! Synchronous in-process multicaster for lifecycle events.
//!
//! Listeners are registered at startup and invoked inline on the emitting
//! task, in registration order. A listener error is logged and never
//! propagates to the emitter.

use std::sync::Arc;

use async_trait::async_trait;

use super::event::OrderEvent;
use super::record::NewAuditRecord;
use crate::error::EngineError;
use crate::store::OrderStore;

/// A registered consumer of lifecycle events.
///
/// Listeners are expected to be quick and side-effect-free apart from
/// their own sink; a returned error is swallowed by the bus.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Stable listener name, used in error logs.
    fn name(&self) -> &'static str;

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the bus and dropped.
    async fn handle(&self, event: &OrderEvent) -> Result<(), EngineError>;
}

/// Multicasts [`OrderEvent`]s to all registered listeners.
///
/// Emission is synchronous: `emit` awaits every listener before
/// returning, which preserves per-order event order as long as emission
/// happens on the worker task that owns the order.
#[derive(Clone, Default)]
pub struct AuditBus {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl std::fmt::Debug for AuditBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl AuditBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Call only during startup wiring.
    pub fn register(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers the event to every listener in registration order.
    ///
    /// Listener errors are logged and swallowed; emission never fails.
    pub async fn emit(&self, event: OrderEvent) {
        for listener in &self.listeners {
            if let Err(e) = listener.handle(&event).await {
                tracing::error!(
                    listener = listener.name(),
                    event_type = event.event_type_str(),
                    error = %e,
                    "audit listener failed"
                );
            }
        }
    }
}

/// Listener that appends every order-scoped event to the audit log.
pub struct AuditLogListener {
    store: Arc<dyn OrderStore>,
}

impl AuditLogListener {
    /// Creates a persisting listener backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventListener for AuditLogListener {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn handle(&self, event: &OrderEvent) -> Result<(), EngineError> {
        let Some(order_id) = event.order_id() else {
            // Unscoped system errors have no audit row.
            return Ok(());
        };
        let event_data = serde_json::to_value(event)
            .map_err(|e| EngineError::Internal(format!("event serialization: {e}")))?;
        self.store
            .append_audit(NewAuditRecord::auto(
                order_id,
                event.event_type_str(),
                event_data,
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::OrderId;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventListener for CountingListener {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &OrderEvent) -> Result<(), EngineError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl EventListener for FailingListener {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &OrderEvent) -> Result<(), EngineError> {
            Err(EngineError::Internal("listener exploded".to_string()))
        }
    }

    fn make_event() -> OrderEvent {
        OrderEvent::ExecutionStarted {
            order_id: OrderId::new(),
            attempt: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn emit_reaches_all_listeners() {
        let counter = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        let mut bus = AuditBus::new();
        bus.register(Arc::clone(&counter) as Arc<dyn EventListener>);
        bus.register(Arc::clone(&counter) as Arc<dyn EventListener>);

        bus.emit(make_event()).await;
        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn listener_error_does_not_stop_delivery() {
        let counter = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        let mut bus = AuditBus::new();
        bus.register(Arc::new(FailingListener));
        bus.register(Arc::clone(&counter) as Arc<dyn EventListener>);

        bus.emit(make_event()).await;
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_bus_emits_without_error() {
        let bus = AuditBus::new();
        assert_eq!(bus.listener_count(), 0);
        bus.emit(make_event()).await;
    }
}
