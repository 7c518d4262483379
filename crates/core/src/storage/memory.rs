use crate::domain::record::{SnapshotSummary, StockRecord, UniverseSnapshot};
use crate::domain::risk::RiskCategory;
use crate::storage::SnapshotStore;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store. Publishing swaps one `Arc`, so a reader holding the old snapshot keeps a
/// consistent view while the new one becomes current.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    current: RwLock<Option<Arc<UniverseSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn current(&self) -> Option<Arc<UniverseSnapshot>> {
        self.current.read().await.clone()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn replace_universe_snapshot(&self, snapshot: UniverseSnapshot) -> anyhow::Result<()> {
        let next = Arc::new(snapshot);
        *self.current.write().await = Some(next);
        Ok(())
    }

    async fn latest_snapshot(&self) -> anyhow::Result<Option<Arc<UniverseSnapshot>>> {
        Ok(self.current().await)
    }

    async fn latest_summary(&self) -> anyhow::Result<Option<SnapshotSummary>> {
        Ok(self.current().await.map(|s| s.summary()))
    }

    async fn query_by_category(
        &self,
        category: RiskCategory,
        limit: usize,
    ) -> anyhow::Result<Vec<StockRecord>> {
        let Some(snap) = self.current().await else {
            return Ok(Vec::new());
        };
        let mut out = snap.by_category(category);
        out.truncate(limit);
        Ok(out)
    }

    async fn get_record(&self, symbol: &str) -> anyhow::Result<Option<StockRecord>> {
        Ok(self
            .current()
            .await
            .and_then(|s| s.get(symbol).cloned()))
    }
}
