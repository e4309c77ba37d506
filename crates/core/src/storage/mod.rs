use anyhow::Context;

pub mod lock;
pub mod refresh_runs;
pub mod symbol_cache;

pub use symbol_cache::PgSymbolCache;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
