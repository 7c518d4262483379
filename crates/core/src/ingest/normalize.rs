use crate::domain::fundamentals::FundamentalSnapshot;
use crate::ingest::types::RawFundamentals;

/// Maps the provider's attribute bag into the scorer's shape.
///
/// Values pass through untouched, except dividend yield which is always a fraction afterwards.
/// Anything the source did not send, or sent as a non-finite number, becomes `None`; nothing is
/// defaulted or inferred from other fields.
pub fn normalize_fundamentals(raw: &RawFundamentals) -> FundamentalSnapshot {
    FundamentalSnapshot {
        pe_ratio: known(raw.trailing_pe),
        market_cap: known(raw.market_cap),
        dividend_yield: dividend_yield_fraction(raw),
        book_value: known(raw.book_value),
        eps: known(raw.trailing_eps),
        high_52w: known(raw.fifty_two_week_high),
        low_52w: known(raw.fifty_two_week_low),
        open_interest: known(raw.open_interest),
    }
}

fn known(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

// The trailing field is already a fraction; the forward field is in percent.
fn dividend_yield_fraction(raw: &RawFundamentals) -> Option<f64> {
    known(raw.trailing_annual_dividend_yield)
        .or_else(|| known(raw.dividend_yield).map(|pct| pct / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scoring::{score, ScoringInputs};
    use crate::ingest::types::QuoteResponse;
    use serde_json::json;

    #[test]
    fn passes_through_present_fields() {
        let raw = RawFundamentals {
            symbol: Some("ITC.NS".to_string()),
            trailing_pe: Some(27.1),
            market_cap: Some(5.2e12),
            dividend_yield: Some(3.4),
            trailing_annual_dividend_yield: Some(0.031),
            book_value: Some(56.3),
            trailing_eps: Some(16.2),
            fifty_two_week_high: Some(528.5),
            fifty_two_week_low: Some(399.35),
            open_interest: Some(12.0),
        };
        let snap = normalize_fundamentals(&raw);
        assert_eq!(snap.pe_ratio, Some(27.1));
        assert_eq!(snap.market_cap, Some(5.2e12));
        assert_eq!(snap.dividend_yield, Some(0.031));
        assert_eq!(snap.book_value, Some(56.3));
        assert_eq!(snap.eps, Some(16.2));
        assert_eq!(snap.high_52w, Some(528.5));
        assert_eq!(snap.low_52w, Some(399.35));
        assert_eq!(snap.open_interest, Some(12.0));
    }

    #[test]
    fn absent_fields_stay_unknown_not_zero() {
        let snap = normalize_fundamentals(&RawFundamentals::default());
        assert_eq!(snap, FundamentalSnapshot::default());
    }

    #[test]
    fn percent_dividend_yield_becomes_a_fraction() {
        let raw = RawFundamentals {
            dividend_yield: Some(0.52),
            ..Default::default()
        };
        let got = normalize_fundamentals(&raw).dividend_yield.unwrap();
        assert!((got - 0.0052).abs() < 1e-12);
    }

    #[test]
    fn small_quoted_yield_does_not_earn_yield_points() {
        let v = json!({
            "quoteResponse": {
                "result": [{"dividendYield": 0.52, "trailingAnnualDividendYield": 0.0052}]
            }
        });
        let parsed: QuoteResponse = serde_json::from_value(v).unwrap();
        let snap = normalize_fundamentals(&parsed.quote_response.result[0]);
        assert_eq!(snap.dividend_yield, Some(0.0052));

        let inputs = ScoringInputs {
            fundamentals: snap,
            ..Default::default()
        };
        assert_eq!(score(&inputs).points_for("dividend_yield"), 0);
    }

    #[test]
    fn three_percent_quoted_yield_lands_in_the_top_band() {
        let raw = RawFundamentals {
            dividend_yield: Some(3.0),
            ..Default::default()
        };
        let inputs = ScoringInputs {
            fundamentals: normalize_fundamentals(&raw),
            ..Default::default()
        };
        assert_eq!(score(&inputs).points_for("dividend_yield"), 2);
    }

    #[test]
    fn zero_is_a_real_value() {
        let raw = RawFundamentals {
            dividend_yield: Some(0.0),
            ..Default::default()
        };
        assert_eq!(normalize_fundamentals(&raw).dividend_yield, Some(0.0));
    }

    #[test]
    fn non_finite_values_become_unknown() {
        let raw = RawFundamentals {
            trailing_pe: Some(f64::INFINITY),
            book_value: Some(f64::NAN),
            market_cap: Some(1.0e12),
            ..Default::default()
        };
        let snap = normalize_fundamentals(&raw);
        assert_eq!(snap.pe_ratio, None);
        assert_eq!(snap.book_value, None);
        assert_eq!(snap.market_cap, Some(1.0e12));
    }
}
