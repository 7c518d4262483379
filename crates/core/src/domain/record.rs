use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::indicators::{round2, IndicatorSet};
use crate::domain::market::{PriceBar, PriceSeries};
use crate::domain::risk::{RiskCategory, StockScore};
use crate::domain::scoring::{self, ScoreBreakdown, ScoringInputs};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Traded value is reported in crores.
const VALUE_TRADED_UNIT: f64 = 1.0e7;

/// Everything known about one symbol as of one refresh cycle. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    pub last_updated: DateTime<Utc>,
    pub latest: PriceBar,
    pub value_traded: Option<f64>,
    pub percent_change: Option<f64>,
    pub price_change: f64,
    pub indicators: IndicatorSet,
    pub fundamentals: FundamentalSnapshot,
    pub total_score: StockScore,
    pub score_breakdown: ScoreBreakdown,
    pub risk_category: RiskCategory,
}

impl StockRecord {
    /// Computes indicators, scores and classifies. `None` when the series has no bars.
    pub fn assemble(
        symbol: &str,
        last_updated: DateTime<Utc>,
        series: &PriceSeries,
        fundamentals: FundamentalSnapshot,
    ) -> Option<Self> {
        let latest = *series.latest()?;
        let indicators = IndicatorSet::compute(series);

        let percent_change = (latest.open != 0.0)
            .then(|| round2((latest.close - latest.open) / latest.open * 100.0))
            .filter(|v| v.is_finite());
        let value_traded =
            Some(round2(latest.volume * latest.close / VALUE_TRADED_UNIT)).filter(|v| v.is_finite());

        let inputs = ScoringInputs {
            close: Some(latest.close),
            volume: Some(latest.volume),
            percent_change,
            indicators,
            fundamentals,
        };
        let assessment = scoring::assess(&inputs);

        Some(Self {
            symbol: symbol.to_string(),
            last_updated,
            latest,
            value_traded,
            percent_change,
            price_change: latest.close - latest.open,
            indicators,
            fundamentals,
            total_score: assessment.total,
            score_breakdown: assessment.breakdown,
            risk_category: assessment.category,
        })
    }
}

/// Ordering used wherever records of one category are listed: best score first, then symbol.
pub fn category_order(a: &StockRecord, b: &StockRecord) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| a.symbol.cmp(&b.symbol))
}

/// The complete set of records produced by one refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of_date: NaiveDate,
    pub provider: String,
    pub symbols_attempted: u32,
    /// Records copied unchanged from the previously published snapshot.
    pub symbols_carried: u32,
    pub records: BTreeMap<String, StockRecord>,
}

impl UniverseSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&StockRecord> {
        self.records.get(symbol)
    }

    pub fn by_category(&self, category: RiskCategory) -> Vec<StockRecord> {
        let mut out: Vec<StockRecord> = self
            .records
            .values()
            .filter(|r| r.risk_category == category)
            .cloned()
            .collect();
        out.sort_by(category_order);
        out
    }

    pub fn summary(&self) -> SnapshotSummary {
        let mut by_category: BTreeMap<RiskCategory, u32> =
            RiskCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for r in self.records.values() {
            *by_category.entry(r.risk_category).or_default() += 1;
        }

        SnapshotSummary {
            id: self.id,
            generated_at: self.generated_at,
            as_of_date: self.as_of_date,
            provider: self.provider.clone(),
            symbols_attempted: self.symbols_attempted,
            symbols_recorded: self.records.len() as u32,
            symbols_carried: self.symbols_carried,
            by_category,
        }
    }
}

/// Snapshot metadata without the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of_date: NaiveDate,
    pub provider: String,
    pub symbols_attempted: u32,
    pub symbols_recorded: u32,
    pub symbols_carried: u32,
    pub by_category: BTreeMap<RiskCategory, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(n: usize, open: f64, close: f64, volume: f64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut bars: Vec<PriceBar> = (0..n.saturating_sub(1))
            .map(|i| {
                let c = 100.0 + (i % 3) as f64;
                PriceBar {
                    date: start + Duration::days(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume,
                }
            })
            .collect();
        if n > 0 {
            bars.push(PriceBar {
                date: start + Duration::days(n as i64 - 1),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume,
            });
        }
        PriceSeries::try_new(bars).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    #[test]
    fn derives_price_action_from_latest_bar() {
        let s = series(30, 100.0, 103.0, 2.0e6);
        let rec = StockRecord::assemble("INFY", ts(), &s, FundamentalSnapshot::default()).unwrap();
        assert_eq!(rec.symbol, "INFY");
        assert_eq!(rec.latest.close, 103.0);
        assert_eq!(rec.percent_change, Some(3.0));
        assert_eq!(rec.price_change, 3.0);
        // 2e6 * 103 / 1e7 = 20.6
        assert_eq!(rec.value_traded, Some(20.6));
        assert_eq!(rec.total_score, rec.score_breakdown.total());
        assert_eq!(rec.risk_category, rec.total_score.category());
    }

    #[test]
    fn zero_open_leaves_percent_change_unknown() {
        let s = series(1, 0.0, 5.0, 10.0);
        let rec = StockRecord::assemble("X", ts(), &s, FundamentalSnapshot::default()).unwrap();
        assert_eq!(rec.percent_change, None);
        assert_eq!(rec.score_breakdown.points_for("daily_change"), 0);
    }

    #[test]
    fn empty_series_produces_no_record() {
        assert!(StockRecord::assemble("X", ts(), &PriceSeries::default(), Default::default()).is_none());
    }

    #[test]
    fn by_category_orders_by_score_then_symbol() {
        let s = series(30, 100.0, 103.0, 2.0e6);
        let base = StockRecord::assemble("A", ts(), &s, FundamentalSnapshot::default()).unwrap();
        let mk = |sym: &str, score: i32| StockRecord {
            symbol: sym.to_string(),
            total_score: StockScore(score),
            risk_category: RiskCategory::Moderate,
            ..base.clone()
        };

        let mut records = BTreeMap::new();
        for r in [mk("C", 7), mk("A", 7), mk("B", 9)] {
            records.insert(r.symbol.clone(), r);
        }
        let snap = UniverseSnapshot {
            id: Uuid::nil(),
            generated_at: ts(),
            as_of_date: ts().date_naive(),
            provider: "test".to_string(),
            symbols_attempted: 3,
            symbols_carried: 0,
            records,
        };

        let ordered: Vec<String> = snap
            .by_category(RiskCategory::Moderate)
            .into_iter()
            .map(|r| r.symbol)
            .collect();
        assert_eq!(ordered, vec!["B", "A", "C"]);
        assert!(snap.by_category(RiskCategory::Risky).is_empty());

        let summary = snap.summary();
        assert_eq!(summary.symbols_recorded, 3);
        assert_eq!(summary.by_category[&RiskCategory::Moderate], 3);
        assert_eq!(summary.by_category[&RiskCategory::Risky], 0);
    }
}
