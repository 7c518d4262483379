use crate::domain::market::Lookback;
use crate::domain::record::{StockRecord, UniverseSnapshot};
use crate::error::{RefreshError, SymbolFetchError};
use crate::ingest::normalize::normalize_fundamentals;
use crate::ingest::provider::MarketDataProvider;
use crate::storage::SnapshotStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;


const DEFAULT_PROGRESS_EVERY: usize = 25;

/// The symbols evaluated every cycle. Symbols are stored bare (`INFY`); the provider sees them with
/// the exchange suffix (`INFY.NS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    symbols: Vec<String>,
    symbol_suffix: String,
}

impl Universe {
    /// Trims, uppercases and de-duplicates (first occurrence wins). Errors on an empty result.
    pub fn new<I, S>(symbols: I, symbol_suffix: &str) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffix = symbol_suffix.trim().to_ascii_uppercase();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for s in symbols {
            let mut sym = s.as_ref().trim().to_ascii_uppercase();
            if !suffix.is_empty() {
                if let Some(bare) = sym.strip_suffix(suffix.as_str()) {
                    sym = bare.to_string();
                }
            }
            if sym.is_empty() {
                continue;
            }
            if seen.insert(sym.clone()) {
                out.push(sym);
            }
        }
        anyhow::ensure!(!out.is_empty(), "universe must contain at least one symbol");

        Ok(Self {
            symbols: out,
            symbol_suffix: suffix,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn provider_symbol(&self, symbol: &str) -> String {
        format!("{symbol}{}", self.symbol_suffix)
    }
}

/// What a cycle publishes for a symbol it could not refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSymbolPolicy {
    /// Keep the previously published record unchanged, including its `last_updated`.
    #[default]
    CarryForward,
    /// Leave the symbol out of the new snapshot.
    Omit,
}

impl fmt::Display for MissingSymbolPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingSymbolPolicy::CarryForward => f.write_str("carry_forward"),
            MissingSymbolPolicy::Omit => f.write_str("omit"),
        }
    }
}

impl FromStr for MissingSymbolPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "carry_forward" => Ok(MissingSymbolPolicy::CarryForward),
            "omit" => Ok(MissingSymbolPolicy::Omit),
            other => anyhow::bail!("unknown missing symbol policy: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub lookback: Lookback,
    pub missing_symbol_policy: MissingSymbolPolicy,
    /// Pause between symbols, to stay under provider rate limits.
    pub req_delay: Duration,
    pub progress_every: usize,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            lookback: Lookback::ThreeMonths,
            missing_symbol_policy: MissingSymbolPolicy::default(),
            req_delay: Duration::ZERO,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl RefreshOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("REFRESH_LOOKBACK") {
            out.lookback = s.parse()?;
        }

        if let Ok(s) = std::env::var("REFRESH_MISSING_SYMBOL_POLICY") {
            out.missing_symbol_policy = s.parse()?;
        }

        if let Some(ms) = std::env::var("REFRESH_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            out.req_delay = Duration::from_millis(ms);
        }

        if let Some(n) = std::env::var("REFRESH_PROGRESS_EVERY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            out.progress_every = n.max(1);
        }

        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "symbol", rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching(String),
    Computing(String),
    Recording(String),
    Publishing,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub snapshot_id: Uuid,
    pub as_of_date: NaiveDate,
    pub attempted: usize,
    pub recorded: usize,
    pub carried_forward: usize,
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

/// Owns one refresh cycle end to end. Shared behind an `Arc`; at most one cycle runs at a time.
pub struct RefreshJob {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn SnapshotStore>,
    universe: Universe,
    options: RefreshOptions,
    running: tokio::sync::Mutex<()>,
    state: std::sync::Mutex<CycleState>,
}

impl RefreshJob {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn SnapshotStore>,
        universe: Universe,
        options: RefreshOptions,
    ) -> Self {
        Self {
            provider,
            store,
            universe,
            options,
            running: tokio::sync::Mutex::new(()),
            state: std::sync::Mutex::new(CycleState::Idle),
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    pub fn state(&self) -> CycleState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_state(&self, next: CycleState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    /// Runs one cycle and publishes its snapshot. Overlapping calls fail fast with
    /// `AlreadyRunning`; a set `cancel` flag stops the cycle at the next symbol boundary without
    /// publishing.
    pub async fn run_cycle(
        &self,
        as_of_date: NaiveDate,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CycleReport, RefreshError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| RefreshError::AlreadyRunning)?;

        let res = self.run_locked(as_of_date, cancel).await;
        self.set_state(CycleState::Idle);
        res
    }

    async fn run_locked(
        &self,
        as_of_date: NaiveDate,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CycleReport, RefreshError> {
        let started = Instant::now();
        let generated_at = Utc::now();
        let symbols = self.universe.symbols();
        let total = symbols.len();
        let every = self.options.progress_every.max(1);

        tracing::info!(
            %as_of_date,
            provider = self.provider.provider_name(),
            symbols = total,
            lookback = %self.options.lookback,
            "refresh cycle started"
        );

        let mut records: BTreeMap<String, StockRecord> = BTreeMap::new();
        let mut failed: Vec<String> = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            if *cancel.borrow() {
                tracing::warn!(processed = i, total, "refresh cycle cancelled");
                return Err(RefreshError::Cancelled {
                    processed: i,
                    total,
                });
            }
            if i > 0 && !self.options.req_delay.is_zero() {
                tokio::time::sleep(self.options.req_delay).await;
            }

            match self.refresh_symbol(symbol, generated_at).await {
                Ok(record) => {
                    self.set_state(CycleState::Recording(symbol.clone()));
                    records.insert(symbol.clone(), record);
                }
                Err(err) => {
                    tracing::warn!(symbol = err.symbol(), error = %err, "symbol refresh failed; skipping");
                    failed.push(symbol.clone());
                }
            }

            let done = i + 1;
            if done == 1 || done % every == 0 || done == total {
                tracing::info!(
                    done,
                    total,
                    recorded = records.len(),
                    failed = failed.len(),
                    "refresh progress"
                );
            }
        }

        if *cancel.borrow() {
            tracing::warn!(processed = total, total, "refresh cycle cancelled before publish");
            return Err(RefreshError::Cancelled {
                processed: total,
                total,
            });
        }

        let carried = match self.options.missing_symbol_policy {
            MissingSymbolPolicy::CarryForward if !failed.is_empty() => {
                self.carry_forward(&failed, &mut records).await
            }
            _ => 0,
        };

        self.set_state(CycleState::Publishing);

        let snapshot = UniverseSnapshot {
            id: Uuid::new_v4(),
            generated_at,
            as_of_date,
            provider: self.provider.provider_name().to_string(),
            symbols_attempted: total as u32,
            symbols_carried: carried as u32,
            records,
        };
        let snapshot_id = snapshot.id;
        let recorded = snapshot.len();

        if recorded == 0 {
            tracing::warn!(%as_of_date, total, "publishing an empty universe snapshot");
        }

        self.store
            .replace_universe_snapshot(snapshot)
            .await
            .map_err(RefreshError::Persistence)?;

        let report = CycleReport {
            snapshot_id,
            as_of_date,
            attempted: total,
            recorded,
            carried_forward: carried,
            failed,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            %snapshot_id,
            %as_of_date,
            attempted = report.attempted,
            recorded = report.recorded,
            carried_forward = report.carried_forward,
            failed = report.failed.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "refresh cycle published"
        );
        Ok(report)
    }

    async fn refresh_symbol(
        &self,
        symbol: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<StockRecord, SymbolFetchError> {
        self.set_state(CycleState::Fetching(symbol.to_string()));
        let provider_symbol = self.universe.provider_symbol(symbol);
        let fetch_err = |source| SymbolFetchError::Provider {
            symbol: symbol.to_string(),
            source,
        };

        let series = self
            .provider
            .fetch_price_series(&provider_symbol, self.options.lookback)
            .await
            .map_err(fetch_err)?;
        if series.is_empty() {
            return Err(SymbolFetchError::EmptyHistory {
                symbol: symbol.to_string(),
            });
        }

        let raw = self
            .provider
            .fetch_fundamentals(&provider_symbol)
            .await
            .map_err(fetch_err)?;

        self.set_state(CycleState::Computing(symbol.to_string()));
        let fundamentals = normalize_fundamentals(&raw);
        StockRecord::assemble(symbol, last_updated, &series, fundamentals).ok_or_else(|| {
            SymbolFetchError::EmptyHistory {
                symbol: symbol.to_string(),
            }
        })
    }

    /// Copies previously published records for `failed` symbols. Returns how many were carried.
    async fn carry_forward(
        &self,
        failed: &[String],
        records: &mut BTreeMap<String, StockRecord>,
    ) -> usize {
        let previous = match self.store.latest_snapshot().await {
            Ok(Some(prev)) => prev,
            Ok(None) => return 0,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "could not load previous snapshot; failed symbols omitted");
                return 0;
            }
        };

        let mut carried = 0;
        for symbol in failed {
            if let Some(rec) = previous.get(symbol) {
                records.insert(symbol.clone(), rec.clone());
                carried += 1;
            }
        }
        if carried > 0 {
            tracing::info!(
                carried,
                previous_snapshot_id = %previous.id,
                "carried forward previous records for failed symbols"
            );
        }
        carried
    }
}
