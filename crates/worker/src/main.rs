use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratingdesk_core::orchestrator::ProviderOrchestrator;
use ratingdesk_core::storage::lock::BatchRefreshLock;
use ratingdesk_core::storage::refresh_runs::{record_refresh_run, RefreshRunRecord};
use ratingdesk_core::storage::PgSymbolCache;

mod symbols;

#[derive(Debug, Parser)]
#[command(name = "ratingdesk_worker")]
struct Args {
    /// Comma-separated tickers to refresh.
    #[arg(long)]
    symbols: Option<String>,

    /// File with one or more tickers per line.
    #[arg(long)]
    symbols_file: Option<PathBuf>,

    /// Resolve the symbol list and exit without calling providers.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ratingdesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let symbols = symbols::collect_symbols(args.symbols.as_deref(), args.symbols_file.as_deref())?;

    if args.dry_run {
        tracing::info!(
            dry_run = true,
            symbols_len = symbols.len(),
            batch_delay_ms = settings.batch_delay_ms,
            "batch refresh (dry-run)"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(3)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    ratingdesk_core::storage::migrate(&pool).await?;

    let Some(lock) = BatchRefreshLock::try_acquire(&pool).await? else {
        tracing::warn!("batch refresh lock not acquired; another run in progress");
        return Ok(());
    };

    let result = run_batch(&settings, &pool, &symbols).await;

    match lock.release().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("batch refresh lock was not held at release"),
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to release batch refresh lock"),
    }

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

async fn run_batch(
    settings: &ratingdesk_core::config::Settings,
    pool: &sqlx::PgPool,
    symbols: &[String],
) -> anyhow::Result<()> {
    let cache = Arc::new(PgSymbolCache::new(pool.clone()));
    let orchestrator = ProviderOrchestrator::from_settings(settings, cache)?;

    let run_id = uuid::Uuid::new_v4();
    let started_at = chrono::Utc::now();
    tracing::info!(%run_id, symbols = symbols.len(), "batch refresh started");

    let summary = orchestrator.refresh_batch(symbols).await;

    let record = RefreshRunRecord {
        id: run_id,
        started_at,
        finished_at: chrono::Utc::now(),
        requested: summary.requested() as i32,
        refreshed: summary.refreshed.len() as i32,
        failed: summary.failed.len() as i32,
        failed_symbols: summary.failed.iter().map(|(s, _)| s.clone()).collect(),
    };
    record_refresh_run(pool, &record).await?;

    for (symbol, reason) in &summary.failed {
        tracing::error!(%run_id, %symbol, %reason, "symbol refresh failed");
    }
    tracing::info!(
        %run_id,
        requested = record.requested,
        refreshed = record.refreshed,
        failed = record.failed,
        "batch refresh finished"
    );
    Ok(())
}

fn init_sentry(settings: &ratingdesk_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
