use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratingdesk_core::cache::{FreshnessCache, InMemoryCache};
use ratingdesk_core::domain::report::SymbolReport;
use ratingdesk_core::error::EngineError;
use ratingdesk_core::orchestrator::ProviderOrchestrator;
use ratingdesk_core::storage::PgSymbolCache;

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

    let cache = connect_cache(&settings).await;
    let orchestrator = ProviderOrchestrator::from_settings(&settings, cache)?;
    tracing::info!(providers = ?orchestrator.provider_names(), "provider chain ready");

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/symbols/:symbol", get(get_symbol))
        .route("/cache", delete(clear_all_cache))
        .route("/cache/:symbol", delete(clear_symbol_cache))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Postgres when reachable; otherwise a process-local cache so the API still serves.
async fn connect_cache(settings: &ratingdesk_core::config::Settings) -> Arc<dyn FreshnessCache> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; using in-memory cache");
            return Arc::new(InMemoryCache::new());
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; using in-memory cache");
            return Arc::new(InMemoryCache::new());
        }
    };

    match ratingdesk_core::storage::migrate(&pool).await {
        Ok(()) => Arc::new(PgSymbolCache::new(pool)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; using in-memory cache");
            Arc::new(InMemoryCache::new())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ProviderOrchestrator>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::DataUnavailable { .. } => StatusCode::NOT_FOUND,
            EngineError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            EngineError::Storage(_) => {
                sentry::capture_error(&self.0);
                tracing::error!(error = %self.0, "cache storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn get_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolReport>, ApiError> {
    let data = state.orchestrator.fetch_symbol_data(&symbol).await?;
    Ok(Json(data.report(chrono::Utc::now())))
}

#[derive(Debug, Serialize)]
struct Cleared {
    cleared: u64,
}

async fn clear_symbol_cache(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError> {
    let existed = state.orchestrator.clear_cache(&symbol).await?;
    tracing::info!(%symbol, existed, "cache entry cleared");
    Ok(if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

async fn clear_all_cache(State(state): State<AppState>) -> Result<Json<Cleared>, ApiError> {
    let cleared = state.orchestrator.clear_all_cache().await?;
    tracing::info!(cleared, "cache cleared");
    Ok(Json(Cleared { cleared }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
