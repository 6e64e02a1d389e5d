//! The uniform venue adapter contract.
//!
//! Every DEX integration implements [`VenueAdapter`]; the rest of the
//! engine treats venues as opaque handles behind this trait. Wallet and
//! runtime configuration are injected at construction, never read from
//! process state mid-execution.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Quote, SwapResult, SwapStatus};

/// Errors a venue adapter can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VenueError {
    /// The venue is disabled or unreachable.
    #[error("venue {0} is unavailable")]
    Unavailable(String),

    /// The venue did not answer within the configured deadline.
    #[error("venue {venue} timed out after {timeout_ms} ms")]
    Timeout {
        /// Venue that timed out.
        venue: String,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Actual output fell below the quote's minimum acceptable output.
    #[error("slippage exceeded on {venue}: received {actual}, minimum {minimum}")]
    SlippageExceeded {
        /// Venue that executed the swap.
        venue: String,
        /// Actual amount out.
        actual: Decimal,
        /// Quote's `minimum_amount_out`.
        minimum: Decimal,
    },

    /// Any other venue-side failure.
    #[error("protocol error on {venue}: {message}")]
    Protocol {
        /// Venue that failed.
        venue: String,
        /// Venue-reported failure detail.
        message: String,
    },
}

/// Uniform interface over one DEX.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Stable venue identifier (e.g. `"meteora"`).
    fn name(&self) -> &str;

    /// Whether the venue participates in quote fan-out.
    fn enabled(&self) -> bool;

    /// Requests a quote for swapping `amount_in` of `token_in` into
    /// `token_out` under the given slippage tolerance (percent).
    ///
    /// # Errors
    ///
    /// - [`VenueError::Unavailable`] when the venue is disabled.
    /// - [`VenueError::Timeout`] when the venue misses its deadline.
    /// - [`VenueError::Protocol`] otherwise.
    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<Quote, VenueError>;

    /// Executes the swap described by `quote` from `wallet`.
    ///
    /// # Errors
    ///
    /// - [`VenueError::SlippageExceeded`] when the realized output is
    ///   below the quote's `minimum_amount_out`.
    /// - [`VenueError::Unavailable`] when the venue is disabled.
    /// - [`VenueError::Protocol`] otherwise.
    async fn execute_swap(&self, quote: &Quote, wallet: &str) -> Result<SwapResult, VenueError>;

    /// Looks up the status of a previously submitted transaction.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Protocol`] for unknown signatures.
    async fn get_transaction_status(&self, signature: &str) -> Result<SwapStatus, VenueError>;

    /// Lightweight liveness probe.
    async fn health_check(&self) -> bool;

    /// Token pairs the venue can swap.
    fn supported_pairs(&self) -> Vec<(String, String)>;
}
