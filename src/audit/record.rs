//! Immutable audit records persisted per order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OrderId;

/// A stored audit row from the `order_history` table.
///
/// Append-only; ordered per order by `(timestamp, event_version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Auto-increment row ID.
    pub id: i64,
    /// Order that generated the event.
    pub order_id: OrderId,
    /// Event tag (e.g. `"execution:swap-confirmed"`).
    pub event_type: String,
    /// JSONB payload with event-specific data.
    pub event_data: serde_json::Value,
    /// Monotonic per-order version.
    pub event_version: u32,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Optional free-form metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Input for appending an audit record.
///
/// When `event_version` is `None` the store assigns the next version for
/// the order under its per-order serialization. When it is `Some`, an
/// existing record with the same `(order_id, event_version)` makes the
/// append an idempotent no-op.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    /// Order the event belongs to.
    pub order_id: OrderId,
    /// Event tag.
    pub event_type: String,
    /// JSONB payload.
    pub event_data: serde_json::Value,
    /// Explicit version for idempotent replays; `None` to auto-assign.
    pub event_version: Option<u32>,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,
}

impl NewAuditRecord {
    /// Builds an auto-versioned record for the given order and payload.
    #[must_use]
    pub fn auto(order_id: OrderId, event_type: &str, event_data: serde_json::Value) -> Self {
        Self {
            order_id,
            event_type: event_type.to_string(),
            event_data,
            event_version: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}
