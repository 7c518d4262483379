//! Technical indicators over a chronological close series.
//!
//! Every function is pure and total: insufficient history yields `None`, never a panic or an
//! error. Results are rounded to two decimals.

use crate::domain::market::PriceSeries;
use serde::{Deserialize, Serialize};

pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const SMA_WINDOW: usize = 20;
pub const EMA_WINDOW: usize = 20;
pub const VOLATILITY_WINDOW: usize = 20;

/// Substituted for an average loss of exactly zero so RS stays finite.
pub const RSI_ZERO_LOSS_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_20: Option<f64>,
    /// Std-dev of daily percent returns, in percent.
    pub volatility: Option<f64>,
}

impl IndicatorSet {
    pub fn compute(series: &PriceSeries) -> Self {
        let closes = series.closes();
        let (macd, macd_signal) = match macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL) {
            Some((m, s)) => (Some(m), Some(s)),
            None => (None, None),
        };

        Self {
            rsi: rsi(&closes, RSI_WINDOW),
            macd,
            macd_signal,
            sma_20: sma(&closes, SMA_WINDOW),
            ema_20: ema(&closes, EMA_WINDOW),
            volatility: volatility(&closes, VOLATILITY_WINDOW),
        }
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Relative Strength Index from simple rolling means of gains and losses.
///
/// The first bar has no predecessor and contributes a zero delta, so `window` bars suffice.
pub fn rsi(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }

    let tail = &closes[closes.len() - window..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for (offset, close) in tail.iter().enumerate() {
        let idx = closes.len() - window + offset;
        if idx == 0 {
            continue;
        }
        let delta = close - closes[idx - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else if delta < 0.0 {
            loss_sum += -delta;
        }
    }

    let avg_gain = gain_sum / window as f64;
    let mut avg_loss = loss_sum / window as f64;
    if avg_loss == 0.0 {
        avg_loss = RSI_ZERO_LOSS_EPSILON;
    }

    let rs = avg_gain / avg_loss;
    let value = 100.0 - 100.0 / (1.0 + rs);
    value.is_finite().then(|| round2(value))
}

/// Recursive EMA seeded from the first value, `alpha = 2 / (span + 1)`.
fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Returns `(macd, signal)` for the latest bar.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64)> {
    if closes.is_empty() || fast == 0 || slow == 0 || signal == 0 {
        return None;
    }

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&line, signal);

    let m = *line.last()?;
    let s = *signal_line.last()?;
    Some((round2(m), round2(s)))
}

pub fn sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    Some(round2(tail.iter().sum::<f64>() / window as f64))
}

pub fn ema(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    ema_series(closes, window).last().map(|v| round2(*v))
}

/// Sample standard deviation of the last `window` day-over-day percent returns.
pub fn volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }

    let tail = &closes[closes.len() - window - 1..];
    let mut returns = Vec::with_capacity(window);
    for pair in tail.windows(2) {
        if pair[0] == 0.0 {
            return None;
        }
        returns.push((pair[1] - pair[0]) / pair[0] * 100.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();
    sd.is_finite().then(|| round2(sd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::PriceBar;
    use chrono::{Duration, NaiveDate};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1_000.0,
            })
            .collect();
        PriceSeries::try_new(bars).unwrap()
    }

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.5 } + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn short_series_yields_unknown_window_indicators() {
        let closes = zigzag(13);
        assert_eq!(rsi(&closes, 14), None);
        assert_eq!(sma(&closes, 20), None);
        assert_eq!(volatility(&closes, 20), None);

        let set = IndicatorSet::compute(&series(&closes));
        assert!(set.rsi.is_none());
        assert!(set.sma_20.is_none());
        assert!(set.volatility.is_none());
    }

    #[test]
    fn empty_series_yields_all_unknown() {
        let set = IndicatorSet::compute(&PriceSeries::default());
        assert_eq!(set, IndicatorSet::default());
    }

    #[test]
    fn rsi_defined_from_exactly_window_bars() {
        let closes = zigzag(14);
        assert!(rsi(&closes, 14).is_some());
    }

    #[test]
    fn rsi_matches_hand_computed_value() {
        // deltas over the window: 0, +2, -1, +2 => gains 4/4, losses 1/4
        let closes = [10.0, 12.0, 11.0, 13.0];
        let v = rsi(&closes, 4).unwrap();
        // RS = 4, RSI = 100 - 100/5 = 80
        assert_eq!(v, 80.0);
    }

    #[test]
    fn rsi_uses_epsilon_when_no_losses() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let v = rsi(&closes, 14).unwrap();
        // RS = 1 / 0.001 = 1000 => 99.90
        assert!(v.is_finite());
        assert_eq!(v, 99.9);
    }

    #[test]
    fn rsi_flat_series_is_zero() {
        let closes = vec![50.0; 20];
        assert_eq!(rsi(&closes, 14), Some(0.0));
    }

    #[test]
    fn rsi_stays_within_bounds() {
        let mut closes = Vec::new();
        let mut x = 100.0;
        for i in 0..120 {
            x += ((i * 37 % 11) as f64 - 5.0) * 0.7;
            closes.push(x);
            let v = rsi(&closes, 14);
            if closes.len() >= 14 {
                let v = v.unwrap();
                assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
            } else {
                assert!(v.is_none());
            }
        }
    }

    #[test]
    fn sma_is_trailing_mean() {
        let closes: Vec<f64> = (1..=25).map(|i| i as f64).collect();
        // last 20 values: 6..=25 => mean 15.5
        assert_eq!(sma(&closes, 20), Some(15.5));
    }

    #[test]
    fn ema_seeded_from_first_value() {
        assert_eq!(ema(&[42.0], 20), Some(42.0));
        // alpha = 2/3 for span 2: 10 -> 10 + 2/3*(13-10) = 12
        assert_eq!(ema(&[10.0, 13.0], 2), Some(12.0));
        assert_eq!(ema(&[], 20), None);
    }

    #[test]
    fn macd_positive_in_uptrend_and_zero_on_flat() {
        let up: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let (m, s) = macd(&up, 12, 26, 9).unwrap();
        assert!(m > 0.0);
        assert!(m > s);

        let flat = vec![100.0; 60];
        assert_eq!(macd(&flat, 12, 26, 9), Some((0.0, 0.0)));
        assert_eq!(macd(&[], 12, 26, 9), None);
    }

    #[test]
    fn volatility_of_constant_returns_is_zero() {
        let mut closes = vec![100.0];
        for _ in 0..25 {
            let last = *closes.last().unwrap();
            closes.push(last * 1.01);
        }
        assert_eq!(volatility(&closes, 20), Some(0.0));
    }

    #[test]
    fn volatility_requires_window_plus_one_bars() {
        let closes = zigzag(20);
        assert_eq!(volatility(&closes, 20), None);
        let closes = zigzag(21);
        assert!(volatility(&closes, 20).unwrap() > 0.0);
    }

    #[test]
    fn compute_is_deterministic() {
        let s = series(&zigzag(64));
        assert_eq!(IndicatorSet::compute(&s), IndicatorSet::compute(&s));
    }
}
