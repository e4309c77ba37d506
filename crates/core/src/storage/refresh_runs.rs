use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRunRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested: i32,
    pub refreshed: i32,
    pub failed: i32,
    pub failed_symbols: Vec<String>,
}

pub async fn record_refresh_run(pool: &sqlx::PgPool, run: &RefreshRunRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO refresh_runs (id, started_at, finished_at, requested, refreshed, failed, failed_symbols) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .persistent(false)
    .bind(run.id)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(run.requested)
    .bind(run.refreshed)
    .bind(run.failed)
    .bind(&run.failed_symbols)
    .execute(pool)
    .await
    .context("insert refresh_runs failed")?;

    Ok(())
}
