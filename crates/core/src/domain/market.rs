use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One trading day for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronological bars for one symbol over a lookback window.
///
/// Construction enforces strictly increasing dates; missing trading days are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn try_new(bars: Vec<PriceBar>) -> anyhow::Result<Self> {
        for pair in bars.windows(2) {
            ensure!(
                pair[0].date < pair[1].date,
                "price bars must be strictly chronological ({} then {})",
                pair[0].date,
                pair[1].date
            );
        }
        Ok(Self { bars })
    }

    /// Sorts and de-duplicates by date (last bar for a date wins).
    pub fn from_unordered(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => out.push(bar),
            }
        }
        Self { bars: out }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// How far back the market-data collaborator should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookback {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl Lookback {
    /// Range token understood by chart-style providers.
    pub fn as_range(&self) -> &'static str {
        match self {
            Lookback::OneDay => "1d",
            Lookback::FiveDays => "5d",
            Lookback::OneMonth => "1mo",
            Lookback::ThreeMonths => "3mo",
            Lookback::SixMonths => "6mo",
            Lookback::OneYear => "1y",
        }
    }

    pub fn approx_days(&self) -> i64 {
        match self {
            Lookback::OneDay => 1,
            Lookback::FiveDays => 5,
            Lookback::OneMonth => 31,
            Lookback::ThreeMonths => 92,
            Lookback::SixMonths => 183,
            Lookback::OneYear => 366,
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_range())
    }
}

impl FromStr for Lookback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Lookback::OneDay),
            "5d" => Ok(Lookback::FiveDays),
            "1mo" => Ok(Lookback::OneMonth),
            "3mo" => Ok(Lookback::ThreeMonths),
            "6mo" => Ok(Lookback::SixMonths),
            "1y" => Ok(Lookback::OneYear),
            other => anyhow::bail!("unsupported lookback: {other}"),
        }
    }
}
