use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session. Used as a best-effort guard against two
// batch refreshes hammering the same providers at once.
const LOCK_NAMESPACE: i64 = 0x5241_5449_4E47; // "RATING"

const BATCH_REFRESH_KEY: i64 = LOCK_NAMESPACE ^ 1;

/// Held batch refresh lock. Acquire and release run on the same pooled connection, so the
/// unlock always reaches the session that owns the lock.
pub struct BatchRefreshLock {
    conn: PoolConnection<Postgres>,
}

impl BatchRefreshLock {
    /// `None` when another session already holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to check out connection for advisory lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(BATCH_REFRESH_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={BATCH_REFRESH_KEY})"))?;
        Ok(acquired.0.then_some(Self { conn }))
    }

    /// Returns whether Postgres reported the lock as held by this session.
    pub async fn release(mut self) -> anyhow::Result<bool> {
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(BATCH_REFRESH_KEY)
            .fetch_one(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={BATCH_REFRESH_KEY})"))?;
        Ok(released.0)
    }
}
