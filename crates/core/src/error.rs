use crate::domain::risk::RiskCategory;
use thiserror::Error;

/// Data acquisition failed for one symbol; the cycle skips it and moves on.
#[derive(Debug, Error)]
pub enum SymbolFetchError {
    #[error("market data request failed for {symbol}: {source:#}")]
    Provider {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no price history returned for {symbol}")]
    EmptyHistory { symbol: String },
}

impl SymbolFetchError {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolFetchError::Provider { symbol, .. } | SymbolFetchError::EmptyHistory { symbol } => {
                symbol
            }
        }
    }
}

/// Reasons a whole refresh cycle ends without publishing.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh cycle is already running")]
    AlreadyRunning,

    #[error("refresh cycle cancelled after {processed} of {total} symbols")]
    Cancelled { processed: usize, total: usize },

    #[error("snapshot persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("no stocks found for risk category {category}")]
    NotFound { category: RiskCategory },

    #[error("snapshot store query failed: {0:#}")]
    Store(#[source] anyhow::Error),
}
