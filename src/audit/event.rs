//! Lifecycle events emitted at every order state transition.
//!
//! Every mutation in the execution pipeline emits an [`OrderEvent`]
//! through the [`super::AuditBus`]. Events are delivered synchronously to
//! registered listeners; the persisting listener appends them to the
//! audit log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{OrderId, OrderStatus, Quote};

/// Typed lifecycle event with a closed set of event tags.
///
/// `Decimal` amounts serialize as JSON strings to preserve fixed-point
/// precision in the audit payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum OrderEvent {
    /// A new order was accepted and persisted.
    #[serde(rename = "order:created")]
    OrderCreated {
        /// Order identifier.
        order_id: OrderId,
        /// Input token.
        token_in: String,
        /// Output token.
        token_out: String,
        /// Input amount (string-encoded decimal).
        amount: String,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The persisted order status changed.
    #[serde(rename = "order:status-changed")]
    OrderStatusChanged {
        /// Order identifier.
        order_id: OrderId,
        /// Previous status.
        from: OrderStatus,
        /// New status.
        to: OrderStatus,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The order reached terminal `failed`.
    #[serde(rename = "order:failed")]
    OrderFailed {
        /// Order identifier.
        order_id: OrderId,
        /// Terminal error message.
        error: String,
        /// Retries consumed.
        retry_count: u32,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The order reached terminal `completed`.
    #[serde(rename = "order:confirmed")]
    OrderConfirmed {
        /// Order identifier.
        order_id: OrderId,
        /// Venue that executed the swap.
        venue: String,
        /// On-chain transaction identifier.
        transaction_hash: String,
        /// Actual execution price (string-encoded decimal).
        executed_price: String,
        /// Confirmation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A worker picked up the order and entered the pipeline.
    #[serde(rename = "execution:started")]
    ExecutionStarted {
        /// Order identifier.
        order_id: OrderId,
        /// Queue delivery attempt (1-based).
        attempt: u32,
        /// Start timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The quote fan-out finished.
    #[serde(rename = "execution:quotes-fetched")]
    QuotesFetched {
        /// Order identifier.
        order_id: OrderId,
        /// Number of successful quotes.
        quote_count: usize,
        /// Per-venue errors, as `venue: message` strings.
        failures: Vec<String>,
        /// Fetch-complete timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The best quote was selected and a venue chosen.
    #[serde(rename = "execution:dex-selected")]
    DexSelected {
        /// Order identifier.
        order_id: OrderId,
        /// Selected venue name.
        venue: String,
        /// The winning quote.
        quote: Quote,
        /// Selection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The swap was handed to the selected venue.
    #[serde(rename = "execution:swap-submitted")]
    SwapSubmitted {
        /// Order identifier.
        order_id: OrderId,
        /// Venue the swap was submitted to.
        venue: String,
        /// Submission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The venue confirmed the swap.
    #[serde(rename = "execution:swap-confirmed")]
    SwapConfirmed {
        /// Order identifier.
        order_id: OrderId,
        /// Transaction signature.
        signature: String,
        /// Actual output amount (string-encoded decimal).
        amount_out: String,
        /// Confirmation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// One execution attempt failed.
    #[serde(rename = "execution:failed")]
    ExecutionFailed {
        /// Order identifier.
        order_id: OrderId,
        /// Attempt error message.
        error: String,
        /// Queue delivery attempt that failed.
        attempt: u32,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A failed attempt was rescheduled.
    #[serde(rename = "execution:retrying")]
    ExecutionRetrying {
        /// Order identifier.
        order_id: OrderId,
        /// Retry count after the increment.
        retry_count: u32,
        /// Retries still available.
        attempts_left: u32,
        /// Error that triggered the retry.
        error: String,
        /// Retry timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An execution job was enqueued.
    #[serde(rename = "queue:job-added")]
    JobAdded {
        /// Order the job references.
        order_id: OrderId,
        /// Queue-assigned job identifier.
        job_id: String,
        /// Enqueue timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An unexpected engine-level error.
    #[serde(rename = "system:error")]
    SystemError {
        /// Related order, when attributable.
        order_id: Option<OrderId>,
        /// Error message.
        message: String,
        /// Error timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl OrderEvent {
    /// Returns the order ID this event is scoped to, if any.
    ///
    /// Only `system:error` may be unscoped.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::OrderFailed { order_id, .. }
            | Self::OrderConfirmed { order_id, .. }
            | Self::ExecutionStarted { order_id, .. }
            | Self::QuotesFetched { order_id, .. }
            | Self::DexSelected { order_id, .. }
            | Self::SwapSubmitted { order_id, .. }
            | Self::SwapConfirmed { order_id, .. }
            | Self::ExecutionFailed { order_id, .. }
            | Self::ExecutionRetrying { order_id, .. }
            | Self::JobAdded { order_id, .. } => Some(*order_id),
            Self::SystemError { order_id, .. } => *order_id,
        }
    }

    /// Returns the event tag as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order:created",
            Self::OrderStatusChanged { .. } => "order:status-changed",
            Self::OrderFailed { .. } => "order:failed",
            Self::OrderConfirmed { .. } => "order:confirmed",
            Self::ExecutionStarted { .. } => "execution:started",
            Self::QuotesFetched { .. } => "execution:quotes-fetched",
            Self::DexSelected { .. } => "execution:dex-selected",
            Self::SwapSubmitted { .. } => "execution:swap-submitted",
            Self::SwapConfirmed { .. } => "execution:swap-confirmed",
            Self::ExecutionFailed { .. } => "execution:failed",
            Self::ExecutionRetrying { .. } => "execution:retrying",
            Self::JobAdded { .. } => "queue:job-added",
            Self::SystemError { .. } => "system:error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn created_event_tag() {
        let event = OrderEvent::OrderCreated {
            order_id: OrderId::new(),
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: "1.0".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "order:created");
    }

    #[test]
    fn serialized_tag_matches_accessor() {
        let event = OrderEvent::SwapSubmitted {
            order_id: OrderId::new(),
            venue: "meteora".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event);
        let Ok(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(
            json.get("event_type").and_then(|v| v.as_str()),
            Some("execution:swap-submitted")
        );
    }

    #[test]
    fn system_error_may_be_unscoped() {
        let event = OrderEvent::SystemError {
            order_id: None,
            message: "queue connection lost".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.order_id(), None);
    }

    #[test]
    fn scoped_events_expose_order_id() {
        let id = OrderId::new();
        let event = OrderEvent::ExecutionRetrying {
            order_id: id,
            retry_count: 1,
            attempts_left: 2,
            error: "slippage exceeded".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.order_id(), Some(id));
    }
}
