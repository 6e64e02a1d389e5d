//! The order entity and its status state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderId;

/// Default slippage tolerance in percent when the client omits it.
pub const DEFAULT_SLIPPAGE_TOLERANCE: &str = "0.5";

/// Default number of execution retries when the client omits it.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on client-selectable retries.
pub const MAX_RETRIES_CEILING: u32 = 10;

/// Lifecycle status of an order.
///
/// ```text
/// pending → processing → routing → submitted → completed
///     ↑         │           │          │
///     └─────────┴───────────┴──────────┴──→ failed
/// ```
///
/// Any non-terminal state may also transition to `cancelled`.
/// `Routing` and `Submitted` are in-memory progress states: they are
/// emitted to the audit log and pushed to subscribers but never written
/// to the `orders.status` column, which stays within the SQL CHECK set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted and waiting for a worker (also the retry re-entry state).
    Pending,
    /// A worker owns the order and execution has started.
    Processing,
    /// A venue has been selected (progress-only, not persisted).
    Routing,
    /// The swap has been submitted to the venue (progress-only, not persisted).
    Submitted,
    /// Swap confirmed; terminal.
    Completed,
    /// Execution failed after exhausting retries; terminal.
    Failed,
    /// Cancelled by the user before completion; terminal.
    Cancelled,
}

impl OrderStatus {
    /// Returns `true` for statuses from which no further transitions are legal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` for statuses allowed in the `orders.status` column.
    ///
    /// `Routing` and `Submitted` are progress-only and excluded.
    #[must_use]
    pub const fn is_persistable(self) -> bool {
        !matches!(self, Self::Routing | Self::Submitted)
    }

    /// Returns `true` if a transition from `self` to `next` is legal.
    ///
    /// Terminal states are sticky. Any non-terminal state may go back to
    /// `Pending` (retry) or forward to `Failed`/`Cancelled`; the success
    /// path advances strictly through the pipeline.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Pending | Self::Failed | Self::Cancelled => true,
            Self::Processing => matches!(self, Self::Pending),
            Self::Routing => matches!(self, Self::Processing),
            Self::Submitted => matches!(self, Self::Routing),
            Self::Completed => matches!(self, Self::Processing | Self::Routing | Self::Submitted),
        }
    }

    /// Returns the status as its wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Routing => "routing",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "routing" => Ok(Self::Routing),
            "submitted" => Ok(Self::Submitted),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status {other:?}")),
        }
    }
}

/// A user request to swap `amount` of `token_in` for `token_out`.
///
/// The central persisted entity. Durable fields only; the progress-only
/// statuses never appear in `status` (see [`OrderStatus::is_persistable`]).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order identifier (immutable after creation).
    pub id: OrderId,
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Input amount (fixed-point, > 0).
    pub amount: Decimal,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Allowed slippage in percent (0 ≤ s ≤ 100).
    pub slippage_tolerance: Decimal,
    /// Maximum execution retries (0..=10).
    pub max_retries: u32,
    /// Retries consumed so far (never exceeds `max_retries`).
    pub retry_count: u32,
    /// Venue that executed (or is executing) the swap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_venue: Option<String>,
    /// Actual execution price once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Decimal>,
    /// On-chain transaction identifier; unique across the store when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Last execution error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Confirmation timestamp for completed orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (bumped on every store update).
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns `true` once the order has reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns how many retries remain before the order fails terminally.
    #[must_use]
    pub const fn retries_left(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }
}

/// Validated input for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Input token identifier (non-empty).
    pub token_in: String,
    /// Output token identifier (non-empty, differs from `token_in`).
    pub token_out: String,
    /// Input amount (> 0).
    pub amount: Decimal,
    /// Slippage tolerance in percent.
    pub slippage_tolerance: Decimal,
    /// Maximum execution retries.
    pub max_retries: u32,
}

/// Partial update applied atomically by the store.
///
/// `None` fields are left untouched; `Some` fields overwrite. Optional
/// columns use a double `Option`: `Some(None)` clears the column.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    /// New status, validated against the transition rules by the store.
    pub status: Option<OrderStatus>,
    /// New retry count.
    pub retry_count: Option<u32>,
    /// Venue selection.
    pub selected_venue: Option<Option<String>>,
    /// Execution price.
    pub executed_price: Option<Option<Decimal>>,
    /// Transaction hash.
    pub transaction_hash: Option<Option<String>>,
    /// Error message.
    pub error_message: Option<Option<String>>,
    /// Confirmation timestamp.
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
}

impl OrderUpdate {
    /// Update that only changes the status.
    #[must_use]
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sticky() {
        for terminal in [
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            for next in [
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Completed,
                OrderStatus::Failed,
                OrderStatus::Cancelled,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} must not transition to {next}"
                );
            }
        }
    }

    #[test]
    fn success_path_is_legal() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Routing));
        assert!(OrderStatus::Routing.can_transition_to(OrderStatus::Submitted));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn retry_returns_to_pending() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn any_non_terminal_can_fail_or_cancel() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Routing,
            OrderStatus::Submitted,
        ] {
            assert!(status.can_transition_to(OrderStatus::Failed));
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn skipping_forward_is_illegal() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Routing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Submitted));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn progress_states_are_not_persistable() {
        assert!(!OrderStatus::Routing.is_persistable());
        assert!(!OrderStatus::Submitted.is_persistable());
        assert!(OrderStatus::Pending.is_persistable());
        assert!(OrderStatus::Processing.is_persistable());
        assert!(OrderStatus::Completed.is_persistable());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Routing,
            OrderStatus::Submitted,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            let parsed: Result<OrderStatus, _> = status.as_str().parse();
            assert_eq!(parsed, Ok(status));
        }
        assert!("limbo".parse::<OrderStatus>().is_err());
    }
}
