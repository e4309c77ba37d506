use crate::cache::{is_fresh, CacheEntry, FreshnessCache};
use crate::config::Settings;
use crate::domain::payload::{
    normalize_symbol, AggregatedPayload, FieldSource, FieldSources, Provenance, Quote,
};
use crate::domain::period::{PeriodBuckets, PeriodKey};
use crate::domain::rating::normalize;
use crate::domain::report::{build_report, Delivery, SymbolReport};
use crate::domain::transition::{sort_newest_first, ActionType, UpgradeEvent};
use crate::error::{EngineError, EngineResult, ProviderCall};
use crate::ingest::types::{TrendRow, UpgradeRow};
use crate::ingest::{HttpJsonProvider, MarketDataProvider};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Entries younger than this are served without touching any provider.
    pub cache_ttl: chrono::Duration,
    /// Deadline for each upstream call. A timeout counts as a provider failure.
    pub call_timeout: Duration,
    /// Pause between consecutive symbols in a batch refresh.
    pub batch_delay: Duration,
    /// Serve the previous entry, flagged stale, when every provider fails.
    pub serve_stale_on_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: chrono::Duration::hours(1),
            call_timeout: Duration::from_secs(5),
            batch_delay: Duration::from_millis(250),
            serve_stale_on_failure: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cache_ttl: chrono::Duration::seconds(settings.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64),
            call_timeout: Duration::from_secs(settings.provider_call_timeout_secs.max(1)),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            serve_stale_on_failure: settings.serve_stale_on_failure,
        }
    }
}

/// Merged payload plus how it was delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolData {
    pub payload: AggregatedPayload,
    pub delivery: Delivery,
}

impl SymbolData {
    fn from_entry(entry: CacheEntry, from_cache: bool, stale: bool) -> Self {
        Self {
            delivery: Delivery {
                provenance: entry.provenance,
                updated_at: entry.updated_at,
                from_cache,
                stale,
            },
            payload: entry.payload,
        }
    }

    pub fn report(&self, now: DateTime<Utc>) -> SymbolReport {
        build_report(&self.payload, self.delivery, now)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRefreshSummary {
    pub refreshed: Vec<(String, Provenance)>,
    pub failed: Vec<(String, String)>,
}

impl BatchRefreshSummary {
    pub fn requested(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }
}

/// Coordinates the provider chain and the cache for one symbol at a time.
///
/// Providers are held in priority order. The first provider to return a quote anchors the
/// pass; every other field is then tried on the anchor and each provider after it, taking the
/// first success. A failure in one field never discards fields already obtained.
pub struct ProviderOrchestrator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: Arc<dyn FreshnessCache>,
    config: OrchestratorConfig,
}

impl ProviderOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        cache: Arc<dyn FreshnessCache>,
        config: OrchestratorConfig,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!providers.is_empty(), "at least one provider is required");
        Ok(Self {
            providers,
            cache,
            config,
        })
    }

    /// Primary provider is required, the secondary joins the chain when configured.
    pub fn from_settings(settings: &Settings, cache: Arc<dyn FreshnessCache>) -> anyhow::Result<Self> {
        let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::with_capacity(2);
        providers.push(Arc::new(HttpJsonProvider::from_settings(
            settings.require_primary_provider()?,
            settings.provider_retries,
        )?));

        if settings.secondary_provider.is_configured() {
            providers.push(Arc::new(HttpJsonProvider::from_settings(
                &settings.secondary_provider,
                settings.provider_retries,
            )?));
        } else {
            tracing::warn!("SECONDARY_PROVIDER_BASE_URL not set; running without fallback provider");
        }

        Self::new(providers, cache, OrchestratorConfig::from_settings(settings))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }

    /// Serves a fresh cache entry when there is one, otherwise runs the provider chain and
    /// writes the merged result through to the cache.
    pub async fn fetch_symbol_data(&self, symbol: &str) -> EngineResult<SymbolData> {
        let key = require_symbol(symbol)?;
        let cached = self.cache.get(&key).await?;

        if let Some(entry) = &cached {
            if is_fresh(entry, self.config.cache_ttl, Utc::now()) {
                tracing::debug!(symbol = %key, provenance = %entry.provenance, "serving fresh cache entry");
                return Ok(SymbolData::from_entry(entry.clone(), true, false));
            }
        }

        let err = match self.refresh_key(&key).await {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };

        match (err, cached) {
            (EngineError::DataUnavailable { reason, .. }, Some(entry))
                if self.config.serve_stale_on_failure =>
            {
                tracing::warn!(
                    symbol = %key,
                    reason = %reason,
                    updated_at = %entry.updated_at,
                    "all providers failed; serving stale cache entry"
                );
                Ok(SymbolData::from_entry(entry, true, true))
            }
            (err, _) => Err(err),
        }
    }

    /// Runs the provider chain regardless of cache freshness.
    pub async fn refresh(&self, symbol: &str) -> EngineResult<SymbolData> {
        let key = require_symbol(symbol)?;
        self.refresh_key(&key).await
    }

    /// Refreshes symbols one after another with `batch_delay` between them. Failures are
    /// collected, never abort the batch.
    pub async fn refresh_batch(&self, symbols: &[String]) -> BatchRefreshSummary {
        let mut seen = HashSet::new();
        let keys: Vec<String> = symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        let total = keys.len();
        let mut summary = BatchRefreshSummary::default();

        for (idx, key) in keys.into_iter().enumerate() {
            if idx != 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            match self.refresh_key(&key).await {
                Ok(data) => summary.refreshed.push((key, data.delivery.provenance)),
                Err(err) => {
                    tracing::warn!(symbol = %key, error = %err, "batch refresh failed for symbol");
                    summary.failed.push((key, err.to_string()));
                }
            }

            let n = idx + 1;
            if n == 1 || n == total || n % 25 == 0 {
                tracing::info!(
                    processed = n,
                    total,
                    refreshed = summary.refreshed.len(),
                    failed = summary.failed.len(),
                    "batch refresh progress"
                );
            }
        }

        summary
    }

    pub async fn clear_cache(&self, symbol: &str) -> EngineResult<bool> {
        Ok(self.cache.clear(&normalize_symbol(symbol)).await?)
    }

    pub async fn clear_all_cache(&self) -> EngineResult<u64> {
        Ok(self.cache.clear_all().await?)
    }

    async fn refresh_key(&self, key: &str) -> EngineResult<SymbolData> {
        let (payload, provenance) = self.fetch_live(key).await?;

        // Partial results are cached too, so a degraded provider is not re-polled per request.
        let entry = self.cache.put(key, &payload, provenance, Utc::now()).await?;
        tracing::info!(
            symbol = %key,
            %provenance,
            has_profile = payload.profile.is_some(),
            has_trend = payload.recommendation_trend.is_some(),
            has_history = payload.upgrade_history.is_some(),
            "refreshed symbol data"
        );
        Ok(SymbolData::from_entry(entry, false, false))
    }

    async fn fetch_live(&self, key: &str) -> EngineResult<(AggregatedPayload, Provenance)> {
        let mut anchored: Option<(usize, Quote)> = None;
        let mut failures = Vec::new();

        for (idx, provider) in self.providers.iter().enumerate() {
            let quoted = self
                .guard(provider.as_ref(), ProviderCall::Quote, provider.fetch_quote(key))
                .await;
            match quoted {
                Ok(quote) => {
                    anchored = Some((idx, quote));
                    break;
                }
                Err(err) => {
                    tracing::warn!(symbol = %key, error = %err, "quote unavailable; trying next provider");
                    failures.push(err.to_string());
                }
            }
        }

        let Some((anchor, quote)) = anchored else {
            return Err(EngineError::DataUnavailable {
                symbol: key.to_string(),
                reason: format!("no provider returned a quote: {}", failures.join("; ")),
            });
        };

        let quote_source = self.source_for(anchor);

        let (profile, profile_source) = self
            .first_success(anchor, ProviderCall::Profile, key, |p| async move {
                p.fetch_profile(key).await
            })
            .await;
        let (trend, trend_source) = self
            .first_success(anchor, ProviderCall::RecommendationTrend, key, |p| async move {
                p.fetch_recommendation_trend(key).await
            })
            .await;
        let (history, history_source) = self
            .first_success(anchor, ProviderCall::UpgradeHistory, key, |p| async move {
                p.fetch_upgrade_history(key).await
            })
            .await;

        let recommendation_trend = trend.map(|rows| bucket_trend(key, rows));
        let upgrade_history = history.map(|rows| classify_history(key, rows));

        let sources = FieldSources {
            quote: quote_source,
            profile: profile_source,
            recommendation_trend: trend_source,
            upgrade_history: history_source,
        };

        let provenance = if anchor > 0 {
            Provenance::FallbackOnly
        } else if sources.all_primary() {
            Provenance::LiveAll
        } else {
            Provenance::LivePartial
        };

        Ok((
            AggregatedPayload {
                symbol: key.to_string(),
                quote,
                profile,
                recommendation_trend,
                upgrade_history,
                sources,
            },
            provenance,
        ))
    }

    /// First provider from `anchor` onward whose `fetch` succeeds within the deadline.
    async fn first_success<T, F, Fut>(
        &self,
        anchor: usize,
        call: ProviderCall,
        key: &str,
        fetch: F,
    ) -> (Option<T>, FieldSource)
    where
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        for (idx, provider) in self.providers.iter().enumerate().skip(anchor) {
            match self.guard(provider.as_ref(), call, fetch(Arc::clone(provider))).await {
                Ok(fetched) => return (Some(fetched), self.source_for(idx)),
                Err(err) => {
                    tracing::warn!(symbol = %key, error = %err, "enrichment call failed");
                }
            }
        }
        (None, FieldSource::Missing)
    }

    /// Applies the per-call deadline and maps any failure to `ProviderUnavailable`.
    async fn guard<T>(
        &self,
        provider: &dyn MarketDataProvider,
        call: ProviderCall,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> EngineResult<T> {
        let reason = match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(Ok(fetched)) => return Ok(fetched),
            Ok(Err(err)) => format!("{err:#}"),
            Err(_) => format!("timed out after {:?}", self.config.call_timeout),
        };

        Err(EngineError::ProviderUnavailable {
            provider: provider.provider_name().to_string(),
            call,
            reason,
        })
    }

    fn source_for(&self, idx: usize) -> FieldSource {
        let name = self.providers[idx].provider_name().to_string();
        if idx == 0 {
            FieldSource::Primary(name)
        } else {
            FieldSource::Fallback(name)
        }
    }
}

fn require_symbol(symbol: &str) -> EngineResult<String> {
    let key = normalize_symbol(symbol);
    if key.is_empty() {
        return Err(EngineError::DataUnavailable {
            symbol: key,
            reason: "symbol must be non-empty".to_string(),
        });
    }
    Ok(key)
}

fn bucket_trend(symbol: &str, rows: Vec<TrendRow>) -> PeriodBuckets {
    PeriodBuckets::bucket(rows.into_iter().filter_map(|row| {
        match row.period.parse::<PeriodKey>() {
            Ok(period) => Some((period, row.counts)),
            Err(err) => {
                tracing::warn!(symbol, error = %err, "skipping trend row with unparsable period");
                None
            }
        }
    }))
}

fn classify_history(symbol: &str, rows: Vec<UpgradeRow>) -> Vec<UpgradeEvent> {
    let mut events: Vec<UpgradeEvent> = rows
        .into_iter()
        .map(|row| {
            let event = UpgradeEvent::new(row.firm, row.from_grade.as_deref(), row.to_grade, row.occurred_at);
            if let Some(reported) = row.action.as_deref().and_then(ActionType::from_provider_label) {
                if reported != event.action_type {
                    tracing::debug!(
                        symbol,
                        firm = %event.firm,
                        reported = reported.as_str(),
                        derived = event.action_type.as_str(),
                        "provider action label disagrees with grade transition"
                    );
                }
            }
            event
        })
        .collect();
    sort_newest_first(&mut events);

    let unrecognized: BTreeSet<&str> = events
        .iter()
        .map(|ev| ev.to_grade.trim())
        .filter(|grade| normalize(grade).is_none())
        .collect();
    if !unrecognized.is_empty() {
        tracing::warn!(
            symbol,
            grades = ?unrecognized,
            "unrecognized rating grades; excluded from scoring"
        );
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::domain::distribution::RatingDistribution;
    use crate::domain::payload::Profile;
    use anyhow::{bail, Result};
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        name: &'static str,
        failing: Vec<ProviderCall>,
        slow: Vec<ProviderCall>,
        calls: Mutex<Vec<ProviderCall>>,
    }

    impl FakeProvider {
        fn healthy(name: &'static str) -> Self {
            Self {
                name,
                ..Default::default()
            }
        }

        fn failing(name: &'static str, failing: &[ProviderCall]) -> Self {
            Self {
                name,
                failing: failing.to_vec(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<ProviderCall> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, call: ProviderCall) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.slow.contains(&call) {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            if self.failing.contains(&call) {
                bail!("{} {call} is down", self.name);
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for FakeProvider {
        fn provider_name(&self) -> &str {
            self.name
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
            self.enter(ProviderCall::Quote).await?;
            Ok(Quote {
                symbol: symbol.to_string(),
                price: if self.name == "primary" { 100.0 } else { 99.0 },
                change: None,
                change_percent: None,
                previous_close: None,
                currency: None,
                as_of: None,
            })
        }

        async fn fetch_profile(&self, _symbol: &str) -> Result<Profile> {
            self.enter(ProviderCall::Profile).await?;
            Ok(Profile {
                name: Some(format!("{} Corp", self.name)),
                ..Default::default()
            })
        }

        async fn fetch_recommendation_trend(&self, _symbol: &str) -> Result<Vec<TrendRow>> {
            self.enter(ProviderCall::RecommendationTrend).await?;
            Ok(vec![
                TrendRow {
                    period: "-1m".into(),
                    counts: RatingDistribution {
                        hold: 2,
                        ..Default::default()
                    },
                },
                TrendRow {
                    period: "0m".into(),
                    counts: RatingDistribution {
                        strong_buy: 10,
                        buy: 5,
                        hold: 3,
                        sell: 1,
                        strong_sell: 1,
                    },
                },
                TrendRow {
                    period: "last month".into(),
                    counts: RatingDistribution::zero(),
                },
            ])
        }

        async fn fetch_upgrade_history(&self, _symbol: &str) -> Result<Vec<UpgradeRow>> {
            self.enter(ProviderCall::UpgradeHistory).await?;
            Ok(vec![
                UpgradeRow {
                    firm: "Acme".into(),
                    from_grade: None,
                    to_grade: "Buy".into(),
                    action: Some("init".into()),
                    occurred_at: Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(),
                },
                UpgradeRow {
                    firm: "Beta".into(),
                    from_grade: Some("Hold".into()),
                    to_grade: "Outperform".into(),
                    action: Some("up".into()),
                    occurred_at: Utc.with_ymd_and_hms(2026, 2, 5, 0, 0, 0).unwrap(),
                },
            ])
        }
    }

    fn orchestrator(
        primary: Arc<FakeProvider>,
        secondary: Arc<FakeProvider>,
        cache: Arc<InMemoryCache>,
    ) -> ProviderOrchestrator {
        let config = OrchestratorConfig {
            call_timeout: Duration::from_millis(200),
            batch_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
            primary as Arc<dyn MarketDataProvider>,
            secondary as Arc<dyn MarketDataProvider>,
        ];
        ProviderOrchestrator::new(providers, cache, config).unwrap()
    }

    #[tokio::test]
    async fn all_primary_calls_succeed_is_live_all() {
        let primary = Arc::new(FakeProvider::healthy("primary"));
        let secondary = Arc::new(FakeProvider::healthy("secondary"));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary.clone(), secondary.clone(), cache.clone());

        let data = orch.fetch_symbol_data("aapl").await.unwrap();
        assert_eq!(data.delivery.provenance, Provenance::LiveAll);
        assert!(!data.delivery.from_cache);
        assert_eq!(data.payload.symbol, "AAPL");
        assert!(secondary.calls().is_empty());

        let trend = data.payload.recommendation_trend.as_ref().unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend.periods()[0], PeriodKey::CURRENT);

        let history = data.payload.upgrade_history.as_ref().unwrap();
        assert_eq!(history[0].firm, "Beta");
        assert_eq!(history[0].action_type, ActionType::Upgrade);
        assert_eq!(history[1].from_grade, "New Coverage");
        assert_eq!(history[1].action_type, ActionType::Init);

        assert!(cache.get("AAPL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn primary_quote_failure_goes_fallback_only() {
        let primary = Arc::new(FakeProvider::failing("primary", &[ProviderCall::Quote]));
        let secondary = Arc::new(FakeProvider::healthy("secondary"));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary.clone(), secondary.clone(), cache);

        let data = orch.fetch_symbol_data("AAPL").await.unwrap();
        assert_eq!(data.delivery.provenance, Provenance::FallbackOnly);
        assert_eq!(data.payload.quote.price, 99.0);
        assert_eq!(primary.calls(), vec![ProviderCall::Quote]);
        assert_eq!(secondary.calls().len(), 4);
        assert_eq!(
            data.payload.sources.profile,
            FieldSource::Fallback("secondary".into())
        );
    }

    #[tokio::test]
    async fn trend_failure_is_backfilled_and_partial() {
        let primary = Arc::new(FakeProvider::failing(
            "primary",
            &[ProviderCall::RecommendationTrend],
        ));
        let secondary = Arc::new(FakeProvider::healthy("secondary"));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary, secondary.clone(), cache);

        let data = orch.fetch_symbol_data("AAPL").await.unwrap();
        assert_eq!(data.delivery.provenance, Provenance::LivePartial);
        assert_eq!(data.payload.quote.price, 100.0);
        assert_eq!(
            data.payload.profile.as_ref().and_then(|p| p.name.as_deref()),
            Some("primary Corp")
        );
        assert_eq!(
            data.payload.sources.recommendation_trend,
            FieldSource::Fallback("secondary".into())
        );
        assert_eq!(secondary.calls(), vec![ProviderCall::RecommendationTrend]);
    }

    #[tokio::test]
    async fn trend_missing_everywhere_keeps_quote_and_profile() {
        let primary = Arc::new(FakeProvider::failing(
            "primary",
            &[ProviderCall::RecommendationTrend],
        ));
        let secondary = Arc::new(FakeProvider::failing(
            "secondary",
            &[ProviderCall::RecommendationTrend],
        ));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary, secondary, cache.clone());

        let data = orch.fetch_symbol_data("AAPL").await.unwrap();
        assert_eq!(data.delivery.provenance, Provenance::LivePartial);
        assert!(data.payload.profile.is_some());
        assert!(data.payload.recommendation_trend.is_none());
        assert_eq!(data.payload.sources.recommendation_trend, FieldSource::Missing);

        let report = data.report(Utc::now());
        assert_eq!(report.consensus_key, "N/A");

        let cached = cache.get("AAPL").await.unwrap().unwrap();
        assert_eq!(cached.provenance, Provenance::LivePartial);
    }

    #[tokio::test]
    async fn slow_enrichment_times_out_without_losing_quote() {
        let primary = Arc::new(FakeProvider {
            name: "primary",
            slow: vec![ProviderCall::Profile],
            ..Default::default()
        });
        let secondary = Arc::new(FakeProvider::failing("secondary", &[ProviderCall::Profile]));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary, secondary, cache);

        let data = orch.fetch_symbol_data("AAPL").await.unwrap();
        assert_eq!(data.payload.quote.price, 100.0);
        assert!(data.payload.profile.is_none());
        assert_eq!(data.delivery.provenance, Provenance::LivePartial);
    }

    #[tokio::test]
    async fn fresh_entry_short_circuits_providers() {
        let primary = Arc::new(FakeProvider::healthy("primary"));
        let secondary = Arc::new(FakeProvider::healthy("secondary"));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary.clone(), secondary, cache);

        orch.fetch_symbol_data("AAPL").await.unwrap();
        let calls_after_first = primary.calls().len();

        let again = orch.fetch_symbol_data("aapl").await.unwrap();
        assert!(again.delivery.from_cache);
        assert!(!again.delivery.stale);
        assert_eq!(again.delivery.provenance, Provenance::LiveAll);
        assert_eq!(primary.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn total_failure_is_data_unavailable_without_cache() {
        let primary = Arc::new(FakeProvider::failing("primary", &[ProviderCall::Quote]));
        let secondary = Arc::new(FakeProvider::failing("secondary", &[ProviderCall::Quote]));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary, secondary, cache.clone());

        let err = orch.fetch_symbol_data("AAPL").await.unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn total_failure_serves_stale_entry_flagged() {
        let healthy = Arc::new(FakeProvider::healthy("primary"));
        let cache = Arc::new(InMemoryCache::new());
        let seeded = orchestrator(healthy, Arc::new(FakeProvider::healthy("secondary")), cache.clone());
        let first = seeded.refresh("AAPL").await.unwrap();

        let old = Utc::now() - chrono::Duration::hours(3);
        cache
            .put("AAPL", &first.payload, first.delivery.provenance, old)
            .await
            .unwrap();

        let primary = Arc::new(FakeProvider::failing("primary", &[ProviderCall::Quote]));
        let secondary = Arc::new(FakeProvider::failing("secondary", &[ProviderCall::Quote]));
        let orch = orchestrator(primary.clone(), secondary, cache.clone());

        let data = orch.fetch_symbol_data("AAPL").await.unwrap();
        assert!(data.delivery.stale);
        assert!(data.delivery.from_cache);
        assert_eq!(data.delivery.updated_at, old);
        assert_eq!(primary.calls(), vec![ProviderCall::Quote]);

        let report = data.report(Utc::now());
        assert!(report.stale);
        assert!(report.age_seconds >= 3 * 3600);

        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
            primary as Arc<dyn MarketDataProvider>,
            Arc::new(FakeProvider::failing("secondary", &[ProviderCall::Quote])) as Arc<dyn MarketDataProvider>,
        ];
        let strict = ProviderOrchestrator::new(
            providers,
            cache,
            OrchestratorConfig {
                serve_stale_on_failure: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            strict.fetch_symbol_data("AAPL").await,
            Err(EngineError::DataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn batch_refresh_is_sequential_and_collects_failures() {
        let primary = Arc::new(FakeProvider::failing("primary", &[ProviderCall::Quote]));
        let secondary = Arc::new(FakeProvider::failing("secondary", &[ProviderCall::Quote]));
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(primary.clone(), secondary, cache);

        let symbols = vec!["aapl".to_string(), "MSFT".to_string(), "AAPL".to_string(), " ".to_string()];
        let summary = orch.refresh_batch(&symbols).await;
        assert_eq!(summary.requested(), 2);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0].0, "AAPL");
        assert_eq!(primary.calls(), vec![ProviderCall::Quote, ProviderCall::Quote]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_refresh_waits_between_symbols_only() {
        let primary = Arc::new(FakeProvider::healthy("primary"));
        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![primary as Arc<dyn MarketDataProvider>];
        let delay = Duration::from_millis(250);
        let orch = ProviderOrchestrator::new(
            providers,
            Arc::new(InMemoryCache::new()),
            OrchestratorConfig {
                batch_delay: delay,
                ..Default::default()
            },
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        orch.refresh_batch(&["AAPL".to_string()]).await;
        assert!(start.elapsed() < delay);

        let symbols: Vec<String> = ["AAPL", "MSFT", "NVDA", "TSLA"].map(String::from).to_vec();
        let start = tokio::time::Instant::now();
        let summary = orch.refresh_batch(&symbols).await;
        let elapsed = start.elapsed();
        assert_eq!(summary.refreshed.len(), 4);
        assert!(elapsed >= delay * 3, "elapsed {elapsed:?}");
        assert!(elapsed < delay * 4, "elapsed {elapsed:?}");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        (out, text)
    }

    #[test]
    fn unrecognized_grades_logged_at_ingest_not_per_report() {
        let now = Utc::now();
        let row = |firm: &str, to: &str, days: i64| UpgradeRow {
            firm: firm.into(),
            from_grade: None,
            to_grade: to.into(),
            action: None,
            occurred_at: now - chrono::Duration::days(days),
        };
        let rows = vec![row("Acme", "Top Pick", 1), row("Beta", "Top Pick", 2), row("Gamma", "Buy", 3)];

        let (events, ingest_logs) = capture_warnings(|| classify_history("AAPL", rows));
        assert_eq!(ingest_logs.matches("unrecognized rating grades").count(), 1);
        assert!(ingest_logs.contains("Top Pick"));

        let payload = AggregatedPayload {
            symbol: "AAPL".into(),
            quote: Quote {
                symbol: "AAPL".into(),
                price: 100.0,
                change: None,
                change_percent: None,
                previous_close: None,
                currency: None,
                as_of: None,
            },
            profile: None,
            recommendation_trend: None,
            upgrade_history: Some(events),
            sources: FieldSources {
                quote: FieldSource::Primary("primary".into()),
                profile: FieldSource::Missing,
                recommendation_trend: FieldSource::Missing,
                upgrade_history: FieldSource::Primary("primary".into()),
            },
        };
        let delivery = Delivery {
            provenance: Provenance::LivePartial,
            updated_at: now,
            from_cache: true,
            stale: false,
        };

        let (report, report_logs) = capture_warnings(|| build_report(&payload, delivery, now));
        assert!(report_logs.is_empty(), "unexpected logs: {report_logs}");
        assert_eq!(report.unrecognized_grades, vec!["Top Pick".to_string()]);
    }

    #[tokio::test]
    async fn empty_symbol_is_rejected() {
        let cache = Arc::new(InMemoryCache::new());
        let orch = orchestrator(
            Arc::new(FakeProvider::healthy("primary")),
            Arc::new(FakeProvider::healthy("secondary")),
            cache,
        );
        assert!(matches!(
            orch.fetch_symbol_data("  ").await,
            Err(EngineError::DataUnavailable { .. })
        ));
    }
}
