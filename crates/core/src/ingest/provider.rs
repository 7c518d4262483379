use crate::domain::market::{Lookback, PriceSeries};
use crate::ingest::types::RawFundamentals;
use anyhow::Result;
use std::time::Duration;

const DEFAULT_RETRIES: u32 = 3;

/// Per-symbol market data. Every call may fail independently (network, rate limits); callers treat
/// failures as scoped to the symbol.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_price_series(&self, symbol: &str, lookback: Lookback) -> Result<PriceSeries>;

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<RawFundamentals>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            out.max_attempts = n.max(1);
        }
        out
    }

    /// Exponential: base, 2 x base, 4 x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << shift)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn stops_after_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        };
        assert!(p.should_retry(1));
        assert!(!p.should_retry(2));
    }
}
