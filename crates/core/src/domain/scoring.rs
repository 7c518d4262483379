//! Additive rule engine that turns indicators, fundamentals and price action into a signed score.
//!
//! Each [`FactorRule`] reads one derived signal and awards the points of the first [`Band`] that
//! contains it. Rules never look at each other, so the evaluation order does not affect the
//! total. An unknown signal skips the rule entirely.

use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::indicators::IndicatorSet;
use crate::domain::risk::{RiskCategory, StockScore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoringInputs {
    pub close: Option<f64>,
    pub volume: Option<f64>,
    /// Intraday move of the latest bar, in percent.
    pub percent_change: Option<f64>,
    pub indicators: IndicatorSet,
    pub fundamentals: FundamentalSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub factor: String,
    pub band: String,
    pub points: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub factors: Vec<ScoreFactor>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> StockScore {
        StockScore(self.factors.iter().map(|f| f.points).sum())
    }

    pub fn points_for(&self, factor: &str) -> i32 {
        self.factors
            .iter()
            .filter(|f| f.factor == factor)
            .map(|f| f.points)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub breakdown: ScoreBreakdown,
    pub total: StockScore,
    pub category: RiskCategory,
}

#[derive(Debug, Clone, Copy)]
pub enum Edge {
    Unbounded,
    Inclusive(f64),
    Exclusive(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub label: &'static str,
    pub lower: Edge,
    pub upper: Edge,
    pub points: i32,
}

impl Band {
    pub fn contains(&self, v: f64) -> bool {
        let above = match self.lower {
            Edge::Unbounded => true,
            Edge::Inclusive(lo) => v >= lo,
            Edge::Exclusive(lo) => v > lo,
        };
        let below = match self.upper {
            Edge::Unbounded => true,
            Edge::Inclusive(hi) => v <= hi,
            Edge::Exclusive(hi) => v < hi,
        };
        above && below
    }
}

pub struct FactorRule {
    pub name: &'static str,
    pub signal: fn(&ScoringInputs) -> Option<f64>,
    /// Checked in order; at most one band applies.
    pub bands: &'static [Band],
}

impl FactorRule {
    pub fn evaluate(&self, inputs: &ScoringInputs) -> Option<ScoreFactor> {
        let v = (self.signal)(inputs).filter(|v| v.is_finite())?;
        let band = self.bands.iter().find(|b| b.contains(v))?;
        Some(ScoreFactor {
            factor: self.name.to_string(),
            band: band.label.to_string(),
            points: band.points,
        })
    }
}

impl std::fmt::Debug for FactorRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorRule")
            .field("name", &self.name)
            .field("bands", &self.bands)
            .finish()
    }
}

use self::Edge::{Exclusive as Ex, Inclusive as In, Unbounded as Open};

pub static RULES: &[FactorRule] = &[
    FactorRule {
        name: "valuation_ratio",
        signal: pe_ratio,
        bands: &[
            Band { label: "10 <= pe <= 25", lower: In(10.0), upper: In(25.0), points: 2 },
            Band { label: "25 < pe <= 40", lower: Ex(25.0), upper: In(40.0), points: 1 },
        ],
    },
    FactorRule {
        name: "market_size",
        signal: market_cap,
        bands: &[
            Band { label: "cap > 5e12", lower: Ex(5e12), upper: Open, points: 2 },
            Band { label: "1e12 <= cap <= 5e12", lower: In(1e12), upper: In(5e12), points: 1 },
        ],
    },
    FactorRule {
        name: "dividend_yield",
        signal: dividend_yield,
        bands: &[
            Band { label: "yield > 2.5%", lower: Ex(0.025), upper: Open, points: 2 },
            Band { label: "1% <= yield <= 2.5%", lower: In(0.01), upper: In(0.025), points: 1 },
        ],
    },
    FactorRule {
        name: "book_value_cushion",
        signal: book_value_cushion,
        bands: &[Band { label: "book >= 0.9 x close", lower: In(0.0), upper: Open, points: 2 }],
    },
    FactorRule {
        name: "momentum_rsi",
        signal: rsi,
        bands: &[
            Band { label: "40 <= rsi <= 60", lower: In(40.0), upper: In(60.0), points: 2 },
            Band { label: "30 <= rsi <= 70", lower: In(30.0), upper: In(70.0), points: 1 },
        ],
    },
    FactorRule {
        name: "trend_macd",
        signal: macd_spread,
        bands: &[Band { label: "macd > signal", lower: Ex(0.0), upper: Open, points: 1 }],
    },
    FactorRule {
        name: "price_vs_sma_20",
        signal: close_over_sma,
        bands: &[Band { label: "close > sma_20", lower: Ex(0.0), upper: Open, points: 1 }],
    },
    FactorRule {
        name: "price_vs_ema_20",
        signal: close_over_ema,
        bands: &[Band { label: "close > ema_20", lower: Ex(0.0), upper: Open, points: 1 }],
    },
    FactorRule {
        name: "volatility",
        signal: volatility,
        bands: &[
            Band { label: "volatility < 2", lower: Open, upper: Ex(2.0), points: 2 },
            Band { label: "2 <= volatility <= 4", lower: In(2.0), upper: In(4.0), points: 1 },
        ],
    },
    FactorRule {
        name: "open_interest",
        signal: open_interest,
        bands: &[
            Band { label: "oi <= 20", lower: Open, upper: In(20.0), points: 2 },
            Band { label: "20 < oi <= 60", lower: Ex(20.0), upper: In(60.0), points: 1 },
        ],
    },
    FactorRule {
        name: "daily_change",
        signal: percent_change,
        bands: &[
            Band { label: "change > 2%", lower: Ex(2.0), upper: Open, points: 3 },
            Band { label: "0 < change <= 2%", lower: Ex(0.0), upper: In(2.0), points: 1 },
            Band { label: "change < -2%", lower: Open, upper: Ex(-2.0), points: -3 },
            Band { label: "-2% <= change < 0", lower: In(-2.0), upper: Ex(0.0), points: -1 },
        ],
    },
    FactorRule {
        name: "volume",
        signal: volume,
        bands: &[
            Band { label: "volume > 10M", lower: Ex(1e7), upper: Open, points: 2 },
            Band { label: "volume > 5M", lower: Ex(5e6), upper: Open, points: 1 },
        ],
    },
    FactorRule {
        name: "near_52w_high",
        signal: distance_to_52w_high,
        bands: &[Band { label: "within 5% of 52w high", lower: Open, upper: Ex(0.05), points: 2 }],
    },
    FactorRule {
        name: "near_52w_low",
        signal: distance_to_52w_low,
        bands: &[Band { label: "within 5% of 52w low", lower: Open, upper: Ex(0.05), points: -2 }],
    },
];

fn pe_ratio(i: &ScoringInputs) -> Option<f64> {
    i.fundamentals.pe_ratio
}

fn market_cap(i: &ScoringInputs) -> Option<f64> {
    i.fundamentals.market_cap
}

fn dividend_yield(i: &ScoringInputs) -> Option<f64> {
    i.fundamentals.dividend_yield
}

// Non-negative exactly when book_value >= 0.9 * close.
fn book_value_cushion(i: &ScoringInputs) -> Option<f64> {
    Some(i.fundamentals.book_value? - 0.9 * i.close?)
}

fn rsi(i: &ScoringInputs) -> Option<f64> {
    i.indicators.rsi
}

fn macd_spread(i: &ScoringInputs) -> Option<f64> {
    Some(i.indicators.macd? - i.indicators.macd_signal?)
}

fn close_over_sma(i: &ScoringInputs) -> Option<f64> {
    Some(i.close? - i.indicators.sma_20?)
}

fn close_over_ema(i: &ScoringInputs) -> Option<f64> {
    Some(i.close? - i.indicators.ema_20?)
}

fn volatility(i: &ScoringInputs) -> Option<f64> {
    i.indicators.volatility
}

fn open_interest(i: &ScoringInputs) -> Option<f64> {
    i.fundamentals.open_interest
}

fn percent_change(i: &ScoringInputs) -> Option<f64> {
    i.percent_change
}

fn volume(i: &ScoringInputs) -> Option<f64> {
    i.volume
}

/// Close, 52w high and 52w low must all be known and positive for either proximity factor.
fn range_52w(i: &ScoringInputs) -> Option<(f64, f64, f64)> {
    let close = i.close.filter(|v| *v > 0.0)?;
    let high = i.fundamentals.high_52w.filter(|v| *v > 0.0)?;
    let low = i.fundamentals.low_52w.filter(|v| *v > 0.0)?;
    Some((close, high, low))
}

fn distance_to_52w_high(i: &ScoringInputs) -> Option<f64> {
    let (close, high, _) = range_52w(i)?;
    Some((high - close) / high)
}

fn distance_to_52w_low(i: &ScoringInputs) -> Option<f64> {
    let (close, _, low) = range_52w(i)?;
    Some((close - low) / low)
}

pub fn score_rules<'a, I>(rules: I, inputs: &ScoringInputs) -> ScoreBreakdown
where
    I: IntoIterator<Item = &'a FactorRule>,
{
    ScoreBreakdown {
        factors: rules
            .into_iter()
            .filter_map(|rule| rule.evaluate(inputs))
            .collect(),
    }
}

pub fn score(inputs: &ScoringInputs) -> ScoreBreakdown {
    score_rules(RULES.iter(), inputs)
}

pub fn assess(inputs: &ScoringInputs) -> RiskAssessment {
    let breakdown = score(inputs);
    let total = breakdown.total();
    RiskAssessment {
        category: total.category(),
        total,
        breakdown,
    }
}
