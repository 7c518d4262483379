use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::indicators::IndicatorSet;
use crate::domain::market::PriceBar;
use crate::domain::record::{SnapshotSummary, StockRecord, UniverseSnapshot};
use crate::domain::risk::{RiskCategory, StockScore};
use crate::domain::scoring::ScoreBreakdown;
use crate::storage::SnapshotStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_INSERT_BATCH: usize = 200;
const DEFAULT_RETENTION: i64 = 12;

const RECORD_COLUMNS: &str = "r.symbol, r.last_updated, r.bar_date, r.open, r.high, r.low, r.close, r.volume, \
     r.value_traded, r.percent_change, r.price_change, r.indicators, r.fundamentals, \
     r.total_score, r.score_breakdown, r.risk_category";

/// Postgres-backed store. Records are staged under a fresh snapshot id and become visible only
/// when the head pointer moves, in the same transaction.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: sqlx::PgPool,
    insert_batch: usize,
    retention: i64,
}

impl PgSnapshotStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        let insert_batch = std::env::var("SNAPSHOT_INSERT_BATCH")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_INSERT_BATCH)
            .max(1);
        // The new head and the one it replaces are always kept.
        let retention = std::env::var("SNAPSHOT_RETENTION")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_RETENTION)
            .max(2);

        Self {
            pool,
            insert_batch,
            retention,
        }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    async fn insert_records(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        snapshot_id: Uuid,
        records: &[&StockRecord],
    ) -> anyhow::Result<u64> {
        let mut affected: u64 = 0;
        for (batch_idx, chunk) in records.chunks(self.insert_batch).enumerate() {
            let t0 = std::time::Instant::now();
            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO stock_records (snapshot_id, symbol, last_updated, bar_date, open, high, low, close, volume, \
                 value_traded, percent_change, price_change, indicators, fundamentals, total_score, score_breakdown, risk_category) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(snapshot_id)
                    .push_bind(r.symbol.as_str())
                    .push_bind(r.last_updated)
                    .push_bind(r.latest.date)
                    .push_bind(r.latest.open)
                    .push_bind(r.latest.high)
                    .push_bind(r.latest.low)
                    .push_bind(r.latest.close)
                    .push_bind(r.latest.volume)
                    .push_bind(r.value_traded)
                    .push_bind(r.percent_change)
                    .push_bind(r.price_change)
                    .push_bind(Json(r.indicators))
                    .push_bind(Json(r.fundamentals))
                    .push_bind(r.total_score.0)
                    .push_bind(Json(r.score_breakdown.clone()))
                    .push_bind(r.risk_category.as_str());
            });

            let res = qb
                .build()
                .persistent(false)
                .execute(&mut **tx)
                .await
                .context("batch insert stock_records failed")?;
            affected += res.rows_affected();

            tracing::debug!(
                %snapshot_id,
                batch_idx = batch_idx + 1,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "stock_records batch insert"
            );
        }
        Ok(affected)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    generated_at: DateTime<Utc>,
    as_of_date: NaiveDate,
    provider: String,
    symbols_attempted: i32,
    symbols_recorded: i32,
    symbols_carried: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct StockRecordRow {
    symbol: String,
    last_updated: DateTime<Utc>,
    bar_date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    value_traded: Option<f64>,
    percent_change: Option<f64>,
    price_change: f64,
    indicators: Json<IndicatorSet>,
    fundamentals: Json<FundamentalSnapshot>,
    total_score: i32,
    score_breakdown: Json<ScoreBreakdown>,
    risk_category: String,
}

impl TryFrom<StockRecordRow> for StockRecord {
    type Error = anyhow::Error;

    fn try_from(row: StockRecordRow) -> anyhow::Result<Self> {
        let risk_category: RiskCategory = row
            .risk_category
            .parse()
            .with_context(|| format!("bad risk_category for {}", row.symbol))?;

        Ok(StockRecord {
            symbol: row.symbol,
            last_updated: row.last_updated,
            latest: PriceBar {
                date: row.bar_date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            },
            value_traded: row.value_traded,
            percent_change: row.percent_change,
            price_change: row.price_change,
            indicators: row.indicators.0,
            fundamentals: row.fundamentals.0,
            total_score: StockScore(row.total_score),
            score_breakdown: row.score_breakdown.0,
            risk_category,
        })
    }
}

fn to_i32(n: u32, what: &str) -> anyhow::Result<i32> {
    i32::try_from(n).with_context(|| format!("{what} out of range: {n}"))
}

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn replace_universe_snapshot(&self, snapshot: UniverseSnapshot) -> anyhow::Result<()> {
        let records: Vec<&StockRecord> = snapshot.records.values().collect();
        let recorded = u32::try_from(records.len()).context("too many records")?;

        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        sqlx::query(
            "INSERT INTO universe_snapshots (id, generated_at, as_of_date, provider, symbols_attempted, symbols_recorded, symbols_carried) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .persistent(false)
        .bind(snapshot.id)
        .bind(snapshot.generated_at)
        .bind(snapshot.as_of_date)
        .bind(&snapshot.provider)
        .bind(to_i32(snapshot.symbols_attempted, "symbols_attempted")?)
        .bind(to_i32(recorded, "symbols_recorded")?)
        .bind(to_i32(snapshot.symbols_carried, "symbols_carried")?)
        .execute(&mut *tx)
        .await
        .context("insert universe_snapshots failed")?;

        let inserted = if records.is_empty() {
            0
        } else {
            self.insert_records(&mut tx, snapshot.id, &records).await?
        };

        let previous: Option<Uuid> = sqlx::query_scalar(
            "SELECT snapshot_id FROM universe_snapshot_head WHERE singleton FOR UPDATE",
        )
        .persistent(false)
        .fetch_optional(&mut *tx)
        .await
        .context("read universe_snapshot_head failed")?;

        sqlx::query(
            "INSERT INTO universe_snapshot_head (singleton, snapshot_id, updated_at) VALUES (TRUE, $1, now()) \
             ON CONFLICT (singleton) DO UPDATE SET snapshot_id = EXCLUDED.snapshot_id, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(snapshot.id)
        .execute(&mut *tx)
        .await
        .context("move universe_snapshot_head failed")?;

        let pruned = sqlx::query(
            "DELETE FROM universe_snapshots \
             WHERE id <> $1 AND id IS DISTINCT FROM $2 \
               AND id NOT IN (SELECT id FROM universe_snapshots ORDER BY generated_at DESC LIMIT $3)",
        )
        .persistent(false)
        .bind(snapshot.id)
        .bind(previous)
        .bind(self.retention)
        .execute(&mut *tx)
        .await
        .context("prune universe_snapshots failed")?
        .rows_affected();

        tx.commit().await.context("commit transaction failed")?;

        tracing::info!(
            snapshot_id = %snapshot.id,
            previous_snapshot_id = ?previous,
            records = inserted,
            pruned,
            "published universe snapshot"
        );
        Ok(())
    }

    async fn latest_snapshot(&self) -> anyhow::Result<Option<Arc<UniverseSnapshot>>> {
        // Both reads must see the same head.
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("set transaction isolation failed")?;

        let head: Option<SnapshotRow> = sqlx::query_as(
            "SELECT s.id, s.generated_at, s.as_of_date, s.provider, s.symbols_attempted, s.symbols_recorded, s.symbols_carried \
             FROM universe_snapshots s JOIN universe_snapshot_head h ON h.snapshot_id = s.id",
        )
        .persistent(false)
        .fetch_optional(&mut *tx)
        .await
        .context("select latest universe snapshot failed")?;

        let Some(head) = head else {
            tx.commit().await.context("commit transaction failed")?;
            return Ok(None);
        };

        let rows: Vec<StockRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records r WHERE r.snapshot_id = $1"
        ))
        .persistent(false)
        .bind(head.id)
        .fetch_all(&mut *tx)
        .await
        .context("select stock_records failed")?;

        tx.commit().await.context("commit transaction failed")?;

        let mut records = BTreeMap::new();
        for row in rows {
            let r = StockRecord::try_from(row)?;
            records.insert(r.symbol.clone(), r);
        }

        Ok(Some(Arc::new(UniverseSnapshot {
            id: head.id,
            generated_at: head.generated_at,
            as_of_date: head.as_of_date,
            provider: head.provider,
            symbols_attempted: head.symbols_attempted.max(0) as u32,
            symbols_carried: head.symbols_carried.max(0) as u32,
            records,
        })))
    }

    async fn latest_summary(&self) -> anyhow::Result<Option<SnapshotSummary>> {
        let rows: Vec<(Uuid, DateTime<Utc>, NaiveDate, String, i32, i32, i32, Option<String>, i64)> =
            sqlx::query_as(
                "SELECT s.id, s.generated_at, s.as_of_date, s.provider, s.symbols_attempted, s.symbols_recorded, s.symbols_carried, \
                        r.risk_category, COUNT(r.symbol) \
                 FROM universe_snapshot_head h \
                 JOIN universe_snapshots s ON s.id = h.snapshot_id \
                 LEFT JOIN stock_records r ON r.snapshot_id = s.id \
                 GROUP BY s.id, r.risk_category",
            )
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("select latest snapshot summary failed")?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let mut summary = SnapshotSummary {
            id: first.0,
            generated_at: first.1,
            as_of_date: first.2,
            provider: first.3.clone(),
            symbols_attempted: first.4.max(0) as u32,
            symbols_recorded: first.5.max(0) as u32,
            symbols_carried: first.6.max(0) as u32,
            by_category: RiskCategory::ALL.iter().map(|c| (*c, 0)).collect(),
        };
        for row in &rows {
            if let Some(category) = row.7.as_deref() {
                let category: RiskCategory = category.parse()?;
                summary
                    .by_category
                    .insert(category, u32::try_from(row.8).unwrap_or(u32::MAX));
            }
        }
        Ok(Some(summary))
    }

    async fn query_by_category(
        &self,
        category: RiskCategory,
        limit: usize,
    ) -> anyhow::Result<Vec<StockRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<StockRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records r \
             JOIN universe_snapshot_head h ON h.snapshot_id = r.snapshot_id \
             WHERE r.risk_category = $1 \
             ORDER BY r.total_score DESC, r.symbol ASC \
             LIMIT $2"
        ))
        .persistent(false)
        .bind(category.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query stock_records by category {category} failed"))?;

        rows.into_iter().map(StockRecord::try_from).collect()
    }

    async fn get_record(&self, symbol: &str) -> anyhow::Result<Option<StockRecord>> {
        let row: Option<StockRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records r \
             JOIN universe_snapshot_head h ON h.snapshot_id = r.snapshot_id \
             WHERE r.symbol = $1"
        ))
        .persistent(false)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select stock_record {symbol} failed"))?;

        row.map(StockRecord::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scoring::ScoreFactor;

    fn row(category: &str) -> StockRecordRow {
        StockRecordRow {
            symbol: "ITC".to_string(),
            last_updated: DateTime::<Utc>::from_timestamp(1_741_000_000, 0).unwrap(),
            bar_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            open: 400.0,
            high: 410.0,
            low: 398.0,
            close: 408.0,
            volume: 1.2e7,
            value_traded: Some(489.6),
            percent_change: Some(2.0),
            price_change: 8.0,
            indicators: Json(IndicatorSet {
                rsi: Some(61.2),
                ..Default::default()
            }),
            fundamentals: Json(FundamentalSnapshot {
                pe_ratio: Some(26.0),
                ..Default::default()
            }),
            total_score: 7,
            score_breakdown: Json(ScoreBreakdown {
                factors: vec![ScoreFactor {
                    factor: "daily_change".to_string(),
                    band: "0 < pc <= 2".to_string(),
                    points: 1,
                }],
            }),
            risk_category: category.to_string(),
        }
    }

    #[test]
    fn row_maps_back_to_record() {
        let rec = StockRecord::try_from(row("moderate")).unwrap();
        assert_eq!(rec.symbol, "ITC");
        assert_eq!(rec.latest.close, 408.0);
        assert_eq!(rec.total_score, StockScore(7));
        assert_eq!(rec.risk_category, RiskCategory::Moderate);
        assert_eq!(rec.indicators.rsi, Some(61.2));
        assert_eq!(rec.fundamentals.pe_ratio, Some(26.0));
        assert_eq!(rec.score_breakdown.points_for("daily_change"), 1);
    }

    #[test]
    fn unknown_category_is_an_error() {
        assert!(StockRecord::try_from(row("speculative")).is_err());
    }

    #[test]
    fn counters_must_fit_the_column() {
        assert_eq!(to_i32(42, "n").unwrap(), 42);
        assert!(to_i32(u32::MAX, "n").is_err());
    }
}
