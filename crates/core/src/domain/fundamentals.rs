use serde::{Deserialize, Serialize};

/// Fundamental attributes for one symbol. Every field is independently optional; `None` means the
/// source did not provide it and the scorer skips the corresponding factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    /// Fraction, e.g. 0.03 for 3%.
    pub dividend_yield: Option<f64>,
    pub book_value: Option<f64>,
    pub eps: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub open_interest: Option<f64>,
}
