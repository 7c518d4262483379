use crate::domain::market::PriceBar;
use anyhow::Context;
use chrono::{DateTime, Utc};

/// Archives one bar into `stock_prices`; a later fetch of the same trading day overwrites it.
pub async fn upsert_price_bar(
    pool: &sqlx::PgPool,
    symbol: &str,
    bar: &PriceBar,
    provider: &str,
    fetched_at: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "INSERT INTO stock_prices (symbol, bar_date, open, high, low, close, volume, provider, fetched_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (symbol, bar_date) DO UPDATE \
           SET open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, close = EXCLUDED.close, \
               volume = EXCLUDED.volume, provider = EXCLUDED.provider, fetched_at = EXCLUDED.fetched_at",
    )
    .persistent(false)
    .bind(symbol.trim())
    .bind(bar.date)
    .bind(bar.open)
    .bind(bar.high)
    .bind(bar.low)
    .bind(bar.close)
    .bind(bar.volume)
    .bind(provider)
    .bind(fetched_at)
    .execute(pool)
    .await
    .with_context(|| format!("upsert stock_prices failed for {symbol}"))?;

    tracing::debug!(%symbol, bar_date = %bar.date, "archived price bar");
    Ok(res.rows_affected())
}
