use crate::domain::recommendation::{Recommendation, EXPLANATION_PLACEHOLDER, MAX_RECOMMENDED};
use crate::domain::record::StockRecord;
use crate::domain::risk::{ProfileScore, RiskCategory};
use crate::error::RecommendError;
use crate::llm::TextGenerator;
use crate::storage::SnapshotStore;
use std::fmt::Write as _;
use std::sync::Arc;

/// Answers "which stocks fit this investor" from the currently published snapshot.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn SnapshotStore>,
    explainer: Option<Arc<dyn TextGenerator>>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn SnapshotStore>, explainer: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { store, explainer }
    }

    pub async fn recommend(&self, score: ProfileScore) -> Result<Recommendation, RecommendError> {
        let category = score.category();
        let stocks = self
            .store
            .query_by_category(category, MAX_RECOMMENDED)
            .await
            .map_err(RecommendError::Store)?;

        if stocks.is_empty() {
            return Err(RecommendError::NotFound { category });
        }

        let explanation = self.explain(category, &stocks).await;
        Ok(Recommendation {
            risk_profile: category,
            recommended_stocks: stocks,
            explanation,
        })
    }

    async fn explain(&self, category: RiskCategory, stocks: &[StockRecord]) -> String {
        let Some(explainer) = self.explainer.as_ref() else {
            return EXPLANATION_PLACEHOLDER.to_string();
        };

        let prompt = build_prompt(category, stocks);
        match explainer.generate_text(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!(provider = %explainer.provider(), "empty explanation from text service");
                EXPLANATION_PLACEHOLDER.to_string()
            }
            Err(err) => {
                tracing::warn!(provider = %explainer.provider(), error = %format!("{err:#}"), "explanation failed");
                EXPLANATION_PLACEHOLDER.to_string()
            }
        }
    }
}

/// One line per stock with valuation, momentum and category, under a one-line instruction.
pub fn build_prompt(category: RiskCategory, stocks: &[StockRecord]) -> String {
    let mut out = format!(
        "The user has a {category} risk profile. Recommend the following stocks and explain briefly why they match this profile:"
    );
    for s in stocks.iter().take(MAX_RECOMMENDED) {
        let _ = write!(
            out,
            "\n{} (PE: {}, RSI: {}, Risk: {})",
            s.symbol,
            fmt_opt(s.fundamentals.pe_ratio),
            fmt_opt(s.indicators.rsi),
            s.risk_category
        );
    }
    out
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{x}"),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fundamentals::FundamentalSnapshot;
    use crate::domain::market::{PriceBar, PriceSeries};
    use crate::domain::record::UniverseSnapshot;
    use crate::llm::Provider;
    use crate::storage::MemorySnapshotStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeExplainer {
        reply: anyhow::Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeExplainer {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(anyhow::anyhow!("status=503")),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for FakeExplainer {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate_text(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    /// A -3% day with nothing else known scores -3, which is risky.
    fn risky_record(symbol: &str, pe: Option<f64>) -> StockRecord {
        let bar = PriceBar {
            date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            open: 100.0,
            high: 100.0,
            low: 97.0,
            close: 97.0,
            volume: 1.0e5,
        };
        let series = PriceSeries::try_new(vec![bar]).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap();
        let fundamentals = FundamentalSnapshot {
            pe_ratio: pe.filter(|p| !(10.0..=40.0).contains(p)),
            ..Default::default()
        };
        StockRecord::assemble(symbol, ts, &series, fundamentals).unwrap()
    }

    async fn store_with(records: Vec<StockRecord>) -> Arc<MemorySnapshotStore> {
        let store = Arc::new(MemorySnapshotStore::new());
        let generated_at = Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap();
        store
            .replace_universe_snapshot(UniverseSnapshot {
                id: Uuid::new_v4(),
                generated_at,
                as_of_date: generated_at.date_naive(),
                provider: "test".to_string(),
                symbols_attempted: records.len() as u32,
                symbols_carried: 0,
                records: records.into_iter().map(|r| (r.symbol.clone(), r)).collect(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn returns_at_most_five_with_explanation() {
        let records: Vec<StockRecord> = ["F", "B", "A", "E", "C", "D", "G"]
            .iter()
            .map(|s| risky_record(s, None))
            .collect();
        let store = store_with(records).await;
        let explainer = Arc::new(FakeExplainer::replying("  They are volatile.  "));
        let svc = RecommendationService::new(store, Some(explainer.clone()));

        let rec = svc.recommend(ProfileScore(95)).await.unwrap();
        assert_eq!(rec.risk_profile, RiskCategory::Risky);
        let symbols: Vec<&str> = rec.recommended_stocks.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(rec.explanation, "They are volatile.");

        let prompts = explainer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("The user has a risky risk profile."));
        assert_eq!(prompts[0].lines().count(), 6);
    }

    #[tokio::test]
    async fn empty_category_is_not_found() {
        let store = store_with(vec![risky_record("A", None)]).await;
        let svc = RecommendationService::new(store, None);

        let err = svc.recommend(ProfileScore(10)).await.unwrap_err();
        assert!(matches!(
            err,
            RecommendError::NotFound {
                category: RiskCategory::RiskAverse
            }
        ));
    }

    #[tokio::test]
    async fn explainer_failure_uses_placeholder() {
        let store = store_with(vec![risky_record("A", None)]).await;
        let svc = RecommendationService::new(store, Some(Arc::new(FakeExplainer::failing())));

        let rec = svc.recommend(ProfileScore(81)).await.unwrap();
        assert_eq!(rec.recommended_stocks.len(), 1);
        assert_eq!(rec.explanation, EXPLANATION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn blank_explanation_uses_placeholder() {
        let store = store_with(vec![risky_record("A", None)]).await;
        let svc = RecommendationService::new(store, Some(Arc::new(FakeExplainer::replying(" \n"))));
        let rec = svc.recommend(ProfileScore(100)).await.unwrap();
        assert_eq!(rec.explanation, EXPLANATION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn no_explainer_uses_placeholder() {
        let store = store_with(vec![risky_record("A", None)]).await;
        let svc = RecommendationService::new(store, None);
        let rec = svc.recommend(ProfileScore(90)).await.unwrap();
        assert_eq!(rec.explanation, EXPLANATION_PLACEHOLDER);
    }

    #[test]
    fn prompt_lists_valuation_and_momentum() {
        let stocks = vec![risky_record("ADANIENT", Some(95.5)), risky_record("PNB", None)];
        let prompt = build_prompt(RiskCategory::Risky, &stocks);
        assert_eq!(
            prompt,
            "The user has a risky risk profile. Recommend the following stocks and explain briefly why they match this profile:\n\
             ADANIENT (PE: 95.5, RSI: n/a, Risk: risky)\n\
             PNB (PE: n/a, RSI: n/a, Risk: risky)"
        );
    }
}
