//! Per-order subscriber registry for live lifecycle updates.
//!
//! The hub maps an order ID to the one live subscriber interested in it
//! (the WebSocket that submitted the order). Delivery is non-blocking
//! from the orchestrator's perspective: a slow or dropped subscriber is
//! evicted, never waited on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{OrderId, OrderStatus};

/// A status frame pushed to subscribers.
///
/// Serialized as `{type:"status", orderId, status, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    /// Always `"status"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Order the update concerns.
    pub order_id: OrderId,
    /// Lifecycle status (including progress-only states).
    pub status: OrderStatus,
    /// Status-specific payload.
    pub data: serde_json::Value,
    /// Push timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Handle to one connected transport.
///
/// The sender is the write half of an unbounded channel drained by the
/// transport task; `send` failing means the transport is gone.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Identity of the owning connection, shared by all orders it
    /// subscribed to.
    pub subscriber_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

impl Subscriber {
    /// Creates a subscriber around the transport's outbound channel.
    #[must_use]
    pub fn new(subscriber_id: Uuid, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            subscriber_id,
            sender,
        }
    }

    fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Process-wide, thread-safe registry of order subscribers.
#[derive(Debug, Default)]
pub struct NotificationHub {
    subscribers: RwLock<HashMap<OrderId, Subscriber>>,
}

impl NotificationHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a subscriber to an order, replacing any previous binding.
    pub async fn register(&self, order_id: OrderId, subscriber: Subscriber) {
        self.subscribers.write().await.insert(order_id, subscriber);
    }

    /// Removes the subscriber for an order.
    pub async fn unregister(&self, order_id: OrderId) {
        self.subscribers.write().await.remove(&order_id);
    }

    /// Removes every binding owned by the given connection. Called by
    /// the transport layer on socket close.
    pub async fn remove_all_by_subscriber(&self, subscriber_id: Uuid) {
        self.subscribers
            .write()
            .await
            .retain(|_, sub| sub.subscriber_id != subscriber_id);
    }

    /// Number of live order subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Pushes a status update to the order's subscriber, if any.
    ///
    /// Returns `true` when a frame was handed to a live transport. A
    /// failed delivery evicts the subscriber. Never blocks on the
    /// transport and never fails.
    pub async fn push_order_update(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        data: serde_json::Value,
    ) -> bool {
        let frame = StatusFrame {
            frame_type: "status",
            order_id,
            status,
            data,
            timestamp: Utc::now(),
        };
        let Ok(serialized) = serde_json::to_string(&frame) else {
            tracing::error!(%order_id, "status frame serialization failed");
            return false;
        };

        let delivered = {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(&order_id) {
                Some(subscriber) => subscriber.send(serialized),
                None => return false,
            }
        };

        if !delivered {
            tracing::debug!(%order_id, "evicting dropped subscriber");
            self.unregister(order_id).await;
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_subscriber() -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Subscriber::new(Uuid::new_v4(), tx), rx)
    }

    #[tokio::test]
    async fn push_reaches_registered_subscriber() {
        let hub = NotificationHub::new();
        let order_id = OrderId::new();
        let (subscriber, mut rx) = make_subscriber();
        hub.register(order_id, subscriber).await;

        let delivered = hub
            .push_order_update(
                order_id,
                OrderStatus::Processing,
                serde_json::json!({"progress": 10}),
            )
            .await;
        assert!(delivered);

        let frame = rx.recv().await;
        let Some(frame) = frame else {
            panic!("expected a frame");
        };
        assert!(frame.contains("\"type\":\"status\""));
        assert!(frame.contains("processing"));
    }

    #[tokio::test]
    async fn push_without_subscriber_is_noop() {
        let hub = NotificationHub::new();
        let delivered = hub
            .push_order_update(OrderId::new(), OrderStatus::Completed, serde_json::json!({}))
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_evicted() {
        let hub = NotificationHub::new();
        let order_id = OrderId::new();
        let (subscriber, rx) = make_subscriber();
        hub.register(order_id, subscriber).await;
        drop(rx);

        let delivered = hub
            .push_order_update(order_id, OrderStatus::Routing, serde_json::json!({}))
            .await;
        assert!(!delivered);
        assert_eq!(hub.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn remove_all_by_subscriber_clears_only_its_orders() {
        let hub = NotificationHub::new();
        let (sub_a, _rx_a) = make_subscriber();
        let (sub_b, _rx_b) = make_subscriber();
        let a_id = sub_a.subscriber_id;

        let order_a1 = OrderId::new();
        let order_a2 = OrderId::new();
        let order_b = OrderId::new();
        hub.register(order_a1, sub_a.clone()).await;
        hub.register(order_a2, sub_a).await;
        hub.register(order_b, sub_b).await;

        hub.remove_all_by_subscriber(a_id).await;
        assert_eq!(hub.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn register_replaces_previous_binding() {
        let hub = NotificationHub::new();
        let order_id = OrderId::new();
        let (old, mut old_rx) = make_subscriber();
        let (new, mut new_rx) = make_subscriber();
        hub.register(order_id, old).await;
        hub.register(order_id, new).await;

        let _ = hub
            .push_order_update(order_id, OrderStatus::Pending, serde_json::json!({}))
            .await;
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }
}
