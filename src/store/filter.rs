//! Query filters for order listing and counting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::OrderStatus;

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    /// Newest first (default).
    #[default]
    CreatedAtDesc,
    /// Oldest first.
    CreatedAtAsc,
}

/// Filter over persisted orders.
///
/// All fields are conjunctive; `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to a single persisted status.
    pub status: Option<OrderStatus>,
    /// Restrict to orders with this input token.
    pub token_in: Option<String>,
    /// Restrict to orders with this output token.
    pub token_out: Option<String>,
    /// Inclusive lower bound on `amount`.
    pub amount_min: Option<Decimal>,
    /// Inclusive upper bound on `amount`.
    pub amount_max: Option<Decimal>,
    /// Only orders created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only orders created at or before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Page size (list queries only).
    pub limit: Option<u32>,
    /// Page offset (list queries only).
    pub offset: Option<u32>,
    /// Sort direction.
    pub sort: OrderSort,
}

impl OrderFilter {
    /// Filter matching a single status.
    #[must_use]
    pub fn by_status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` if the order passes every set constraint
    /// (pagination and sort excluded).
    #[must_use]
    pub fn matches(&self, order: &crate::domain::Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(token_in) = &self.token_in
            && order.token_in != *token_in
        {
            return false;
        }
        if let Some(token_out) = &self.token_out
            && order.token_out != *token_out
        {
            return false;
        }
        if let Some(min) = self.amount_min
            && order.amount < min
        {
            return false;
        }
        if let Some(max) = self.amount_max
            && order.amount > max
        {
            return false;
        }
        if let Some(after) = self.created_after
            && order.created_at < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && order.created_at > before
        {
            return false;
        }
        true
    }
}
