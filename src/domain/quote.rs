//! Quotes and swap results returned by venue adapters.
//!
//! Quotes are ephemeral: they are compared, the best one is executed,
//! and none of them is ever persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A venue's non-binding offer for a swap at a moment in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Venue that produced the quote.
    pub venue_name: String,
    /// Input amount the quote is for.
    pub amount_in: Decimal,
    /// Offered output amount (> 0).
    pub amount_out: Decimal,
    /// Output per unit of input.
    pub price_per_token: Decimal,
    /// Estimated price impact in percent.
    pub price_impact: Decimal,
    /// Floor on acceptable output: `amount_out · (1 − slippage/100)`.
    pub minimum_amount_out: Decimal,
    /// Estimated venue fee in output token units.
    pub estimated_fee: Decimal,
    /// Route the venue would take (pool addresses or hop labels).
    pub route: Vec<String>,
    /// When the quote was produced.
    pub timestamp: DateTime<Utc>,
    /// Seconds until the venue considers the quote stale.
    pub expires_in_seconds: u64,
}

impl Quote {
    /// Computes the minimum acceptable output for the given slippage
    /// tolerance in percent.
    #[must_use]
    pub fn minimum_out(amount_out: Decimal, slippage_tolerance: Decimal) -> Decimal {
        amount_out * (Decimal::ONE - slippage_tolerance / Decimal::ONE_HUNDRED)
    }
}

/// Status of a submitted swap transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    /// Submitted, awaiting confirmation.
    Pending,
    /// Confirmed on the venue.
    Completed,
    /// Rejected or dropped by the venue.
    Failed,
}

/// Outcome of a swap submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResult {
    /// Unique transaction identifier assigned by the venue.
    pub signature: String,
    /// Venue that executed the swap.
    pub venue_name: String,
    /// Actual output amount delivered.
    pub amount_out: Decimal,
    /// Actual execution price (output per unit input).
    pub execution_price: Decimal,
    /// Submission timestamp.
    pub executed_at: DateTime<Utc>,
    /// Transaction status at return time.
    pub status: SwapStatus,
}
