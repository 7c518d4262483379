use crate::domain::record::{SnapshotSummary, StockRecord, UniverseSnapshot};
use crate::domain::risk::RiskCategory;
use anyhow::Context;
use std::sync::Arc;

pub mod lock;
pub mod memory;
pub mod prices;
pub mod snapshots;

pub use memory::MemorySnapshotStore;
pub use snapshots::PgSnapshotStore;

/// Holds the published universe snapshot. Readers see either the previous snapshot or the new one,
/// never a mix.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Publishes `snapshot` as the new current snapshot. On error the previous one stays current.
    async fn replace_universe_snapshot(&self, snapshot: UniverseSnapshot) -> anyhow::Result<()>;

    async fn latest_snapshot(&self) -> anyhow::Result<Option<Arc<UniverseSnapshot>>>;

    async fn latest_summary(&self) -> anyhow::Result<Option<SnapshotSummary>>;

    /// Records of one category from the current snapshot, best score first, ties by symbol.
    async fn query_by_category(
        &self,
        category: RiskCategory,
        limit: usize,
    ) -> anyhow::Result<Vec<StockRecord>>;

    async fn get_record(&self, symbol: &str) -> anyhow::Result<Option<StockRecord>>;
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
