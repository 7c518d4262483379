use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Session-scoped advisory lock so two worker processes never run refresh cycles at the same time.
// The lock lives on one pooled connection for its whole lifetime.
const REFRESH_LOCK_KEY: i64 = 0x4C45_4E53_5246; // "LENSRF"

#[derive(Debug)]
pub struct RefreshLock {
    conn: Option<PoolConnection<Postgres>>,
}

impl RefreshLock {
    /// `Ok(None)` when another session already holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("acquire connection for refresh lock failed")?;

        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(REFRESH_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={REFRESH_LOCK_KEY})"))?;

        Ok(acquired.0.then_some(Self { conn: Some(conn) }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(REFRESH_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={REFRESH_LOCK_KEY})"))?;
        Ok(())
    }
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        // Not released explicitly: close the session instead of handing a locked connection back
        // to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
