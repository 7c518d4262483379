use anyhow::Context;
use clap::{Parser, Subcommand};
use lens_core::domain::market::Lookback;
use lens_core::error::RefreshError;
use lens_core::ingest::provider::MarketDataProvider;
use lens_core::ingest::stub::StubMarketData;
use lens_core::ingest::yahoo::YahooMarketData;
use lens_core::refresh::{RefreshJob, RefreshOptions};
use lens_core::storage::lock::RefreshLock;
use lens_core::storage::{MemorySnapshotStore, PgSnapshotStore, SnapshotStore};
use lens_core::time::MarketCalendar;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod universe;

const DEFAULT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "lens_worker")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Market as-of date (YYYY-MM-DD). Defaults to the current NSE trading date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Run a single refresh cycle and exit.
    #[arg(long)]
    once: bool,

    /// Publish to an in-memory store and log the result instead of writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Seconds between refresh cycles (REFRESH_INTERVAL_SECS, default 300).
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Skip ticks outside the NSE cash session.
    #[arg(long)]
    market_hours_only: bool,

    /// Use deterministic synthetic market data instead of the HTTP provider.
    #[arg(long)]
    stub_provider: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch today's bar for one symbol.
    Quote {
        symbol: String,

        /// Archive the bar into stock_prices.
        #[arg(long)]
        store: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = lens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let calendar = MarketCalendar::from_env();
    let as_of_date = calendar.resolve_as_of_date(args.as_of_date.as_deref(), chrono::Utc::now())?;

    let provider: Arc<dyn MarketDataProvider> = if args.stub_provider {
        Arc::new(StubMarketData::new(as_of_date))
    } else {
        Arc::new(YahooMarketData::from_settings(&settings)?)
    };

    let universe_opts = universe::UniverseOptions::from_env();

    if let Some(Command::Quote { symbol, store }) = &args.command {
        return run_quote(&settings, &universe_opts, provider.as_ref(), symbol, *store).await;
    }

    let universe = universe_opts.build()?;
    let options = RefreshOptions::from_env()?;

    let (store, pool): (Arc<dyn SnapshotStore>, Option<sqlx::PgPool>) = if args.dry_run {
        (Arc::new(MemorySnapshotStore::new()), None)
    } else {
        let pool = connect(&settings).await?;
        (Arc::new(PgSnapshotStore::new(pool.clone())), Some(pool))
    };

    let lock = match &pool {
        Some(pool) => match RefreshLock::try_acquire(pool).await? {
            Some(lock) => Some(lock),
            None => {
                tracing::warn!("refresh lock not acquired; another worker is running");
                return Ok(());
            }
        },
        None => None,
    };

    tracing::info!(
        symbols = universe.len(),
        dry_run = args.dry_run,
        provider = provider.provider_name(),
        missing_symbol_policy = %options.missing_symbol_policy,
        "worker starting"
    );

    let job = RefreshJob::new(provider, store.clone(), universe, options);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested; stopping after the current symbol");
            let _ = cancel_tx.send(true);
        }
        cancel_tx.closed().await;
    });

    let res = if args.once {
        run_once(&job, as_of_date, &cancel_rx).await
    } else {
        let interval_secs = args
            .interval_secs
            .or_else(|| {
                std::env::var("REFRESH_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
            })
            .unwrap_or(DEFAULT_INTERVAL_SECS)
            .max(1);
        run_loop(
            &job,
            &calendar,
            &args,
            Duration::from_secs(interval_secs),
            cancel_rx,
        )
        .await
    };

    if args.dry_run {
        log_dry_run_summary(store.as_ref()).await;
    }

    if let Some(lock) = lock {
        if let Err(err) = lock.release().await {
            tracing::warn!(error = %err, "failed to release refresh lock");
        }
    }
    res
}

async fn run_once(
    job: &RefreshJob,
    as_of_date: chrono::NaiveDate,
    cancel: &watch::Receiver<bool>,
) -> anyhow::Result<()> {
    match job.run_cycle(as_of_date, cancel).await {
        Ok(_) => Ok(()),
        Err(RefreshError::Cancelled { .. }) => Ok(()),
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
    }
}

async fn run_loop(
    job: &RefreshJob,
    calendar: &MarketCalendar,
    args: &Args,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    // A slow cycle delays the next tick instead of causing a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => {}
        }
        if *cancel.borrow() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        if args.market_hours_only && !calendar.is_trading_session(now)? {
            tracing::debug!(%now, "outside trading session; skipping tick");
            continue;
        }

        let as_of_date = calendar.resolve_as_of_date(args.as_of_date.as_deref(), now)?;
        match job.run_cycle(as_of_date, &cancel).await {
            Ok(_) => {}
            Err(RefreshError::Cancelled { .. }) => return Ok(()),
            Err(RefreshError::AlreadyRunning) => {
                tracing::warn!("previous refresh cycle still running; tick skipped");
            }
            Err(err) => {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "refresh cycle failed; previous snapshot kept");
            }
        }
    }
}

async fn run_quote(
    settings: &lens_core::config::Settings,
    universe_opts: &universe::UniverseOptions,
    provider: &dyn MarketDataProvider,
    symbol: &str,
    store: bool,
) -> anyhow::Result<()> {
    let universe = universe::UniverseOptions {
        symbols: Some(symbol.to_string()),
        ..universe_opts.clone()
    }
    .build()?;
    let Some(symbol) = universe.symbols().first() else {
        anyhow::bail!("empty symbol");
    };
    let provider_symbol = universe.provider_symbol(symbol);

    let series = provider
        .fetch_price_series(&provider_symbol, Lookback::OneDay)
        .await
        .with_context(|| format!("quote fetch failed for {provider_symbol}"))?;
    let bar = *series
        .latest()
        .with_context(|| format!("no bar returned for {provider_symbol}"))?;

    tracing::info!(
        %symbol,
        date = %bar.date,
        open = bar.open,
        high = bar.high,
        low = bar.low,
        close = bar.close,
        volume = bar.volume,
        "latest quote"
    );

    if store {
        let pool = connect(settings).await?;
        lens_core::storage::prices::upsert_price_bar(
            &pool,
            symbol,
            &bar,
            provider.provider_name(),
            chrono::Utc::now(),
        )
        .await?;
        tracing::info!(%symbol, date = %bar.date, "stored quote");
    }
    Ok(())
}

async fn connect(settings: &lens_core::config::Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    lens_core::storage::migrate(&pool).await?;
    Ok(pool)
}

async fn log_dry_run_summary(store: &dyn SnapshotStore) {
    match store.latest_summary().await {
        Ok(Some(summary)) => match serde_json::to_string(&summary) {
            Ok(json) => tracing::info!(dry_run = true, summary = %json, "snapshot summary"),
            Err(err) => tracing::warn!(error = %err, "failed to serialize snapshot summary"),
        },
        Ok(None) => tracing::info!(dry_run = true, "no snapshot published"),
        Err(err) => tracing::warn!(error = %err, "failed to read snapshot summary"),
    }
}

fn init_sentry(settings: &lens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
