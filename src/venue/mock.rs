//! Scripted mock venue for tests and local runs.
//!
//! [`MockVenue`] quotes at a fixed rate and executes with configurable
//! drift. Failures can be scripted per call, which is how the test
//! suite reproduces slippage retries and venue outages.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::adapter::{VenueAdapter, VenueError};
use crate::domain::{Quote, SwapResult, SwapStatus};

/// A venue adapter with deterministic, scriptable behavior.
pub struct MockVenue {
    name: String,
    enabled: AtomicBool,
    healthy: AtomicBool,
    /// Output per unit input: `amount_out = amount_in · rate`.
    rate: Decimal,
    /// Flat fee reported on quotes, in output token units.
    fee: Decimal,
    /// Simulated venue latency applied to quotes and swaps.
    latency: Duration,
    /// Errors to return from `get_quote`, consumed front to back.
    quote_errors: Mutex<VecDeque<VenueError>>,
    /// Errors to return from `execute_swap`, consumed front to back.
    swap_errors: Mutex<VecDeque<VenueError>>,
    /// Scripted actual outputs, consumed front to back. When empty the
    /// swap delivers exactly the quoted amount.
    swap_outputs: Mutex<VecDeque<Decimal>>,
    /// Statuses for issued signatures.
    statuses: Mutex<HashMap<String, SwapStatus>>,
    swap_seq: AtomicU64,
    pairs: Vec<(String, String)>,
}

impl MockVenue {
    /// Creates an enabled venue quoting at the given rate.
    #[must_use]
    pub fn new(name: &str, rate: Decimal) -> Self {
        Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            rate,
            fee: Decimal::ZERO,
            latency: Duration::ZERO,
            quote_errors: Mutex::new(VecDeque::new()),
            swap_errors: Mutex::new(VecDeque::new()),
            swap_outputs: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            swap_seq: AtomicU64::new(0),
            pairs: vec![("SOL".to_string(), "USDC".to_string())],
        }
    }

    /// Sets the flat quote fee.
    #[must_use]
    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Sets the simulated latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the supported token pairs.
    #[must_use]
    pub fn with_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.pairs = pairs;
        self
    }

    /// Enables or disables the venue.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Marks the venue unhealthy without disabling it.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Scripts an error for the next `get_quote` call.
    pub async fn push_quote_error(&self, error: VenueError) {
        self.quote_errors.lock().await.push_back(error);
    }

    /// Scripts an error for the next `execute_swap` call.
    pub async fn push_swap_error(&self, error: VenueError) {
        self.swap_errors.lock().await.push_back(error);
    }

    /// Scripts the actual output of the next `execute_swap` call.
    pub async fn push_swap_output(&self, amount_out: Decimal) {
        self.swap_outputs.lock().await.push_back(amount_out);
    }

    /// Number of swaps this venue has executed.
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swap_seq.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn get_quote(
        &self,
        _token_in: &str,
        _token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<Quote, VenueError> {
        if !self.enabled() {
            return Err(VenueError::Unavailable(self.name.clone()));
        }
        if let Some(error) = self.quote_errors.lock().await.pop_front() {
            return Err(error);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let amount_out = amount_in * self.rate;
        Ok(Quote {
            venue_name: self.name.clone(),
            amount_in,
            amount_out,
            price_per_token: self.rate,
            price_impact: Decimal::ZERO,
            minimum_amount_out: Quote::minimum_out(amount_out, slippage_tolerance),
            estimated_fee: self.fee,
            route: vec![format!("{}-direct", self.name)],
            timestamp: Utc::now(),
            expires_in_seconds: 30,
        })
    }

    async fn execute_swap(&self, quote: &Quote, _wallet: &str) -> Result<SwapResult, VenueError> {
        if !self.enabled() {
            return Err(VenueError::Unavailable(self.name.clone()));
        }
        if let Some(error) = self.swap_errors.lock().await.pop_front() {
            return Err(error);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let amount_out = self
            .swap_outputs
            .lock()
            .await
            .pop_front()
            .unwrap_or(quote.amount_out);
        if amount_out < quote.minimum_amount_out {
            return Err(VenueError::SlippageExceeded {
                venue: self.name.clone(),
                actual: amount_out,
                minimum: quote.minimum_amount_out,
            });
        }

        let seq = self.swap_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = format!("{}-sig-{seq}", self.name);
        self.statuses
            .lock()
            .await
            .insert(signature.clone(), SwapStatus::Completed);

        let execution_price = if quote.amount_in.is_zero() {
            Decimal::ZERO
        } else {
            amount_out / quote.amount_in
        };
        Ok(SwapResult {
            signature,
            venue_name: self.name.clone(),
            amount_out,
            execution_price,
            executed_at: Utc::now(),
            status: SwapStatus::Completed,
        })
    }

    async fn get_transaction_status(&self, signature: &str) -> Result<SwapStatus, VenueError> {
        self.statuses
            .lock()
            .await
            .get(signature)
            .copied()
            .ok_or_else(|| VenueError::Protocol {
                venue: self.name.clone(),
                message: format!("unknown signature {signature}"),
            })
    }

    async fn health_check(&self) -> bool {
        self.enabled() && self.healthy.load(Ordering::SeqCst)
    }

    fn supported_pairs(&self) -> Vec<(String, String)> {
        self.pairs.clone()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn quote_applies_rate_and_slippage_floor() {
        let venue = MockVenue::new("meteora", dec!(96.2));
        let quote = venue.get_quote("SOL", "USDC", dec!(1.0), dec!(1.0)).await;
        let Ok(quote) = quote else {
            panic!("quote failed");
        };
        assert_eq!(quote.amount_out, dec!(96.20));
        assert_eq!(quote.minimum_amount_out, dec!(95.238));
    }

    #[tokio::test]
    async fn disabled_venue_is_unavailable() {
        let venue = MockVenue::new("raydium", dec!(95.5));
        venue.set_enabled(false);
        let result = venue.get_quote("SOL", "USDC", dec!(1.0), dec!(0.5)).await;
        assert!(matches!(result, Err(VenueError::Unavailable(_))));
        assert!(!venue.health_check().await);
    }

    #[tokio::test]
    async fn scripted_output_below_minimum_is_slippage_exceeded() {
        let venue = MockVenue::new("meteora", dec!(96.2));
        let Ok(quote) = venue.get_quote("SOL", "USDC", dec!(1.0), dec!(1.0)).await else {
            panic!("quote failed");
        };
        venue.push_swap_output(dec!(94.0)).await;

        let result = venue.execute_swap(&quote, "wallet-1").await;
        assert!(matches!(result, Err(VenueError::SlippageExceeded { .. })));
        assert_eq!(venue.swap_count(), 0);
    }

    #[tokio::test]
    async fn swap_issues_trackable_signature() {
        let venue = MockVenue::new("meteora", dec!(96.2));
        let Ok(quote) = venue.get_quote("SOL", "USDC", dec!(1.0), dec!(1.0)).await else {
            panic!("quote failed");
        };
        let result = venue.execute_swap(&quote, "wallet-1").await;
        let Ok(result) = result else {
            panic!("swap failed");
        };
        assert_eq!(result.status, SwapStatus::Completed);

        let status = venue.get_transaction_status(&result.signature).await;
        assert_eq!(status.ok(), Some(SwapStatus::Completed));
    }
}
