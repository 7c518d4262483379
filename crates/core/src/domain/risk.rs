use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered by increasing risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    RiskAverse,
    Moderate,
    Risky,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 3] = [
        RiskCategory::RiskAverse,
        RiskCategory::Moderate,
        RiskCategory::Risky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::RiskAverse => "risk_averse",
            RiskCategory::Moderate => "moderate",
            RiskCategory::Risky => "risky",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "risk_averse" => Ok(RiskCategory::RiskAverse),
            "moderate" => Ok(RiskCategory::Moderate),
            "risky" => Ok(RiskCategory::Risky),
            other => anyhow::bail!("unknown risk category: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    AtLeast(i32),
    AtMost(i32),
}

impl Bound {
    fn admits(&self, score: i32) -> bool {
        match *self {
            Bound::AtLeast(lo) => score >= lo,
            Bound::AtMost(hi) => score <= hi,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub bound: Bound,
    pub category: RiskCategory,
}

/// Ordered tiers; the first admitting tier wins, otherwise `fallback`.
#[derive(Debug)]
pub struct ThresholdTable {
    pub name: &'static str,
    pub tiers: &'static [Tier],
    pub fallback: RiskCategory,
}

pub fn classify(table: &ThresholdTable, score: i32) -> RiskCategory {
    table
        .tiers
        .iter()
        .find(|tier| tier.bound.admits(score))
        .map(|tier| tier.category)
        .unwrap_or(table.fallback)
}

/// Rule-engine totals: higher means steadier.
pub static STOCK_SCORE_THRESHOLDS: ThresholdTable = ThresholdTable {
    name: "stock_score",
    tiers: &[
        Tier {
            bound: Bound::AtLeast(10),
            category: RiskCategory::RiskAverse,
        },
        Tier {
            bound: Bound::AtLeast(6),
            category: RiskCategory::Moderate,
        },
    ],
    fallback: RiskCategory::Risky,
};

/// Caller-supplied questionnaire totals: higher means more appetite for risk.
pub static PROFILE_SCORE_THRESHOLDS: ThresholdTable = ThresholdTable {
    name: "profile_score",
    tiers: &[
        Tier {
            bound: Bound::AtMost(40),
            category: RiskCategory::RiskAverse,
        },
        Tier {
            bound: Bound::AtMost(80),
            category: RiskCategory::Moderate,
        },
    ],
    fallback: RiskCategory::Risky,
};

/// Total produced by the scoring rule table for one stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockScore(pub i32);

impl StockScore {
    pub fn category(self) -> RiskCategory {
        classify(&STOCK_SCORE_THRESHOLDS, self.0)
    }
}

/// Composite risk-tolerance score supplied by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileScore(pub i32);

impl ProfileScore {
    pub fn category(self) -> RiskCategory {
        classify(&PROFILE_SCORE_THRESHOLDS, self.0)
    }
}
