use crate::domain::market::{PriceBar, PriceSeries};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Fundamental attributes as delivered by the market-data collaborator, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFundamentals {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, rename = "trailingPE")]
    pub trailing_pe: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Forward yield in percent units (0.52 means 0.52%).
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    /// Trailing yield as a fraction (0.0052 means 0.52%).
    #[serde(default)]
    pub trailing_annual_dividend_yield: Option<f64>,
    #[serde(default)]
    pub book_value: Option<f64>,
    #[serde(default, alias = "epsTrailingTwelveMonths")]
    pub trailing_eps: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_high: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_low: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub quote_response: QuoteEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteEnvelope {
    #[serde(default)]
    pub result: Vec<RawFundamentals>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartEnvelope {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    /// Exchange offset from UTC in seconds; bar dates are taken in exchange-local time.
    #[serde(default)]
    pub gmtoffset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartQuote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Rows with any missing OHLCV value are dropped rather than filled.
    pub fn into_series(self) -> anyhow::Result<PriceSeries> {
        let offset = FixedOffset::east_opt(self.meta.gmtoffset.unwrap_or(0))
            .context("invalid exchange gmtoffset")?;
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();

        let mut bars = Vec::with_capacity(self.timestamp.len());
        for (i, ts) in self.timestamp.iter().enumerate() {
            let cell = |col: &Vec<Option<f64>>| col.get(i).copied().flatten();
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                cell(&quote.open),
                cell(&quote.high),
                cell(&quote.low),
                cell(&quote.close),
                cell(&quote.volume),
            ) else {
                continue;
            };

            let date = DateTime::<Utc>::from_timestamp(*ts, 0)
                .with_context(|| format!("timestamp out of range: {ts}"))?
                .with_timezone(&offset)
                .date_naive();

            bars.push(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        Ok(PriceSeries::from_unordered(bars))
    }
}
