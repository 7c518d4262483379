use crate::domain::market::{Lookback, PriceBar, PriceSeries};
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::RawFundamentals;
use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Offline provider producing a deterministic series per symbol. Used by `--stub-provider` runs
/// and by tests that need realistic-looking data without the network.
#[derive(Debug, Clone)]
pub struct StubMarketData {
    end: NaiveDate,
}

impl StubMarketData {
    pub fn new(end: NaiveDate) -> Self {
        Self { end }
    }

    fn seed(symbol: &str) -> u64 {
        // FNV-1a
        symbol.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
    }

    fn trading_days(&self, lookback: Lookback) -> Vec<NaiveDate> {
        let start = self.end - Duration::days(lookback.approx_days());
        let mut days = Vec::new();
        let mut d = self.end;
        while d > start {
            if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                days.push(d);
            }
            d -= Duration::days(1);
        }
        if days.is_empty() {
            days.push(self.end);
        }
        days.reverse();
        days
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for StubMarketData {
    fn provider_name(&self) -> &'static str {
        "stub"
    }

    async fn fetch_price_series(&self, symbol: &str, lookback: Lookback) -> Result<PriceSeries> {
        let seed = Self::seed(symbol);
        let base = 50.0 + (seed % 4_950) as f64;
        let amplitude = 0.01 + (seed % 7) as f64 * 0.005;
        let drift = ((seed >> 8) % 5) as f64 * 0.0008 - 0.0016;
        let volume = 1.0e5 + ((seed >> 16) % 2_000_000) as f64;

        let bars = self
            .trading_days(lookback)
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let t = i as f64;
                let phase = (seed % 360) as f64;
                let close = base * (1.0 + drift * t + amplitude * (t / 3.0 + phase).sin());
                let open = close * (1.0 - amplitude * 0.5 * (t / 2.0 + phase).cos());
                PriceBar {
                    date,
                    open,
                    high: open.max(close) * 1.005,
                    low: open.min(close) * 0.995,
                    close,
                    volume: volume * (1.0 + 0.2 * (t + phase).sin()),
                }
            })
            .collect();

        PriceSeries::try_new(bars)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<RawFundamentals> {
        let seed = Self::seed(symbol);
        let base = 50.0 + (seed % 4_950) as f64;
        Ok(RawFundamentals {
            symbol: Some(symbol.to_string()),
            trailing_pe: Some(8.0 + (seed % 40) as f64),
            market_cap: Some(5.0e10 * (1 + (seed >> 4) % 400) as f64),
            dividend_yield: Some(((seed >> 12) % 50) as f64 / 10.0),
            trailing_annual_dividend_yield: Some(((seed >> 12) % 50) as f64 / 1_000.0),
            book_value: Some(base * (0.3 + ((seed >> 20) % 10) as f64 / 10.0)),
            trailing_eps: Some(base / (8.0 + (seed % 40) as f64)),
            fifty_two_week_high: Some(base * 1.25),
            fifty_two_week_low: Some(base * 0.8),
            open_interest: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    #[tokio::test]
    async fn same_symbol_same_series() {
        let p = StubMarketData::new(end());
        let a = p.fetch_price_series("INFY", Lookback::ThreeMonths).await.unwrap();
        let b = p.fetch_price_series("INFY", Lookback::ThreeMonths).await.unwrap();
        assert_eq!(a, b);
        assert!(a.len() > 26 + 9, "enough bars for every indicator");
        assert_eq!(a.latest().unwrap().date, end());
    }

    #[tokio::test]
    async fn different_symbols_differ() {
        let p = StubMarketData::new(end());
        let a = p.fetch_price_series("INFY", Lookback::OneMonth).await.unwrap();
        let b = p.fetch_price_series("TCS", Lookback::OneMonth).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn skips_weekends() {
        let p = StubMarketData::new(end());
        let s = p.fetch_price_series("ITC", Lookback::OneMonth).await.unwrap();
        assert!(s
            .bars()
            .iter()
            .all(|b| !matches!(b.date.weekday(), Weekday::Sat | Weekday::Sun)));
    }
}
