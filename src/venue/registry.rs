//! Venue registry and quote aggregator.
//!
//! [`VenueRegistry`] holds the adapter handles and fans quote requests
//! out to every enabled venue concurrently. Failures are isolated per
//! adapter: one venue erroring or timing out never aborts the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rust_decimal::Decimal;

use super::adapter::{VenueAdapter, VenueError};
use crate::domain::Quote;

/// Default wall-clock deadline for one venue's quote.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregate-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Every enabled venue failed to quote.
    #[error("no quotes available from {attempted} venue(s): {detail}")]
    NoQuotesAvailable {
        /// How many venues were asked.
        attempted: usize,
        /// Per-venue failure summary.
        detail: String,
    },
}

/// Result of a quote fan-out: successes, per-venue failures, and the
/// health map computed in parallel.
#[derive(Debug)]
pub struct QuoteSweep {
    /// Successful quotes, in adapter registration order.
    pub quotes: Vec<Quote>,
    /// `(venue, error)` for each adapter that failed.
    pub failures: Vec<(String, VenueError)>,
    /// Liveness of every registered adapter (enabled or not).
    pub health: HashMap<String, bool>,
}

/// Best-quote selection: the winner plus comparison data.
#[derive(Debug)]
pub struct BestQuote {
    /// Head of the ranked list.
    pub best: Quote,
    /// All successful quotes, best first.
    pub ranked: Vec<Quote>,
    /// Per-venue failures observed during the sweep.
    pub failures: Vec<(String, VenueError)>,
}

/// Holds the venue adapters and aggregates their quotes.
pub struct VenueRegistry {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    quote_timeout: Duration,
}

impl std::fmt::Debug for VenueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRegistry")
            .field("adapters", &self.adapter_names())
            .field("quote_timeout", &self.quote_timeout)
            .finish()
    }
}

impl VenueRegistry {
    /// Creates a registry with the default quote deadline.
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>) -> Self {
        Self {
            adapters,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }

    /// Overrides the per-venue quote deadline.
    #[must_use]
    pub fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = timeout;
        self
    }

    /// Returns the adapter with the given name, if registered.
    #[must_use]
    pub fn adapter(&self, name: &str) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(Arc::clone)
    }

    /// Names of all registered adapters.
    #[must_use]
    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Fans `get_quote` out to every enabled adapter concurrently, each
    /// bounded by the quote deadline, and probes health in parallel.
    pub async fn get_all_quotes(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> QuoteSweep {
        let timeout_ms = u64::try_from(self.quote_timeout.as_millis()).unwrap_or(u64::MAX);

        let quote_futs = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                if !adapter.enabled() {
                    return (
                        adapter.name().to_string(),
                        Err(VenueError::Unavailable(adapter.name().to_string())),
                    );
                }
                let result = tokio::time::timeout(
                    self.quote_timeout,
                    adapter.get_quote(token_in, token_out, amount_in, slippage_tolerance),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(VenueError::Timeout {
                        venue: adapter.name().to_string(),
                        timeout_ms,
                    })
                });
                (adapter.name().to_string(), result)
            }
        });

        let health_futs = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move { (adapter.name().to_string(), adapter.health_check().await) }
        });

        let (quote_results, health_results) =
            tokio::join!(join_all(quote_futs), join_all(health_futs));

        let mut quotes = Vec::new();
        let mut failures = Vec::new();
        for (venue, result) in quote_results {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(error) => {
                    tracing::debug!(venue, error = %error, "quote fan-out failure");
                    failures.push((venue, error));
                }
            }
        }

        QuoteSweep {
            quotes,
            failures,
            health: health_results.into_iter().collect(),
        }
    }

    /// Selects the best quote across all enabled venues.
    ///
    /// Ranking is deterministic: `amount_out` descending, then
    /// `estimated_fee` ascending, then `venue_name` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NoQuotesAvailable`] when no venue
    /// produced a quote.
    pub async fn get_best_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<BestQuote, AggregateError> {
        let sweep = self
            .get_all_quotes(token_in, token_out, amount_in, slippage_tolerance)
            .await;

        let mut ranked = sweep.quotes;
        ranked.sort_by(|a, b| {
            b.amount_out
                .cmp(&a.amount_out)
                .then(a.estimated_fee.cmp(&b.estimated_fee))
                .then(a.venue_name.cmp(&b.venue_name))
        });

        let Some(best) = ranked.first().cloned() else {
            let detail = if sweep.failures.is_empty() {
                "no venues enabled".to_string()
            } else {
                sweep
                    .failures
                    .iter()
                    .map(|(venue, error)| format!("{venue}: {error}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(AggregateError::NoQuotesAvailable {
                attempted: self.adapters.len(),
                detail,
            });
        };

        tracing::debug!(
            venue = %best.venue_name,
            amount_out = %best.amount_out,
            candidates = ranked.len(),
            "best quote selected"
        );
        Ok(BestQuote {
            best,
            ranked,
            failures: sweep.failures,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::venue::mock::MockVenue;
    use rust_decimal_macros::dec;

    fn registry_with(venues: Vec<MockVenue>) -> VenueRegistry {
        VenueRegistry::new(
            venues
                .into_iter()
                .map(|v| Arc::new(v) as Arc<dyn VenueAdapter>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn best_quote_prefers_highest_output() {
        let registry = registry_with(vec![
            MockVenue::new("raydium", dec!(95.5)),
            MockVenue::new("meteora", dec!(96.2)),
        ]);

        let best = registry
            .get_best_quote("SOL", "USDC", dec!(1.0), dec!(1.0))
            .await;
        let Ok(best) = best else {
            panic!("expected a best quote");
        };
        assert_eq!(best.best.venue_name, "meteora");
        assert_eq!(best.ranked.len(), 2);
    }

    #[tokio::test]
    async fn fee_breaks_output_ties() {
        let registry = registry_with(vec![
            MockVenue::new("raydium", dec!(96.2)).with_fee(dec!(0.30)),
            MockVenue::new("meteora", dec!(96.2)).with_fee(dec!(0.10)),
        ]);

        let best = registry
            .get_best_quote("SOL", "USDC", dec!(1.0), dec!(0.5))
            .await;
        let Ok(best) = best else {
            panic!("expected a best quote");
        };
        assert_eq!(best.best.venue_name, "meteora");
    }

    #[tokio::test]
    async fn name_breaks_full_ties_deterministically() {
        let registry = registry_with(vec![
            MockVenue::new("raydium", dec!(96.2)),
            MockVenue::new("meteora", dec!(96.2)),
        ]);

        let best = registry
            .get_best_quote("SOL", "USDC", dec!(1.0), dec!(0.5))
            .await;
        let Ok(best) = best else {
            panic!("expected a best quote");
        };
        assert_eq!(best.best.venue_name, "meteora");
    }

    #[tokio::test]
    async fn one_venue_down_does_not_abort_fanout() {
        let down = MockVenue::new("raydium", dec!(95.5));
        down.set_enabled(false);
        let registry = registry_with(vec![down, MockVenue::new("meteora", dec!(96.2))]);

        let sweep = registry
            .get_all_quotes("SOL", "USDC", dec!(1.0), dec!(0.5))
            .await;
        assert_eq!(sweep.quotes.len(), 1);
        assert_eq!(sweep.failures.len(), 1);
        assert_eq!(sweep.health.get("raydium"), Some(&false));
        assert_eq!(sweep.health.get("meteora"), Some(&true));
    }

    #[tokio::test]
    async fn all_venues_down_is_no_quotes_available() {
        let a = MockVenue::new("raydium", dec!(95.5));
        let b = MockVenue::new("meteora", dec!(96.2));
        a.set_enabled(false);
        b.set_enabled(false);
        let registry = registry_with(vec![a, b]);

        let result = registry
            .get_best_quote("SOL", "USDC", dec!(1.0), dec!(0.5))
            .await;
        assert!(matches!(
            result,
            Err(AggregateError::NoQuotesAvailable { attempted: 2, .. })
        ));
    }

    #[tokio::test]
    async fn slow_venue_times_out_but_fast_one_wins() {
        let slow = MockVenue::new("raydium", dec!(99.0))
            .with_latency(Duration::from_millis(200));
        let registry = registry_with(vec![slow, MockVenue::new("meteora", dec!(96.2))])
            .with_quote_timeout(Duration::from_millis(50));

        let best = registry
            .get_best_quote("SOL", "USDC", dec!(1.0), dec!(0.5))
            .await;
        let Ok(best) = best else {
            panic!("expected a best quote");
        };
        assert_eq!(best.best.venue_name, "meteora");
        assert!(
            best.failures
                .iter()
                .any(|(venue, error)| venue == "raydium"
                    && matches!(error, VenueError::Timeout { .. }))
        );
    }
}
