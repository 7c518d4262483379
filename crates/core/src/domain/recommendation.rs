use crate::domain::record::StockRecord;
use crate::domain::risk::RiskCategory;
use serde::{Deserialize, Serialize};

/// Shown when the text-generation collaborator fails or returns nothing.
pub const EXPLANATION_PLACEHOLDER: &str = "No explanation available.";

/// Maximum number of stocks returned with a recommendation.
pub const MAX_RECOMMENDED: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub risk_profile: RiskCategory,
    pub recommended_stocks: Vec<StockRecord>,
    pub explanation: String,
}
