pub mod cache;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod storage;

pub mod config {
    use anyhow::Context;

    const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
    const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_PROVIDER_RETRIES: u32 = 2;
    const DEFAULT_BATCH_DELAY_MS: u64 = 250;

    #[derive(Debug, Clone)]
    pub struct ProviderSettings {
        pub name: String,
        pub base_url: Option<String>,
        pub api_key: Option<String>,
    }

    impl ProviderSettings {
        fn from_env(prefix: &str, default_name: &str) -> Self {
            Self {
                name: std::env::var(format!("{prefix}_PROVIDER_NAME"))
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| default_name.to_string()),
                base_url: std::env::var(format!("{prefix}_PROVIDER_BASE_URL")).ok(),
                api_key: std::env::var(format!("{prefix}_PROVIDER_API_KEY")).ok(),
            }
        }

        pub fn is_configured(&self) -> bool {
            self.base_url.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub primary_provider: ProviderSettings,
        pub secondary_provider: ProviderSettings,
        pub cache_ttl_secs: u64,
        pub provider_call_timeout_secs: u64,
        pub provider_retries: u32,
        pub batch_delay_ms: u64,
        pub serve_stale_on_failure: bool,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                primary_provider: ProviderSettings::from_env("PRIMARY", "primary"),
                secondary_provider: ProviderSettings::from_env("SECONDARY", "secondary"),
                cache_ttl_secs: env_parse("CACHE_TTL_SECS")?.unwrap_or(DEFAULT_CACHE_TTL_SECS),
                provider_call_timeout_secs: env_parse("PROVIDER_CALL_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
                provider_retries: env_parse("PROVIDER_RETRIES")?
                    .unwrap_or(DEFAULT_PROVIDER_RETRIES),
                batch_delay_ms: env_parse("BATCH_DELAY_MS")?.unwrap_or(DEFAULT_BATCH_DELAY_MS),
                serve_stale_on_failure: env_parse("SERVE_STALE_ON_FAILURE")?.unwrap_or(true),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_primary_provider(&self) -> anyhow::Result<&ProviderSettings> {
            anyhow::ensure!(
                self.primary_provider.is_configured(),
                "PRIMARY_PROVIDER_BASE_URL is required"
            );
            Ok(&self.primary_provider)
        }
    }

    /// Unset or blank is `None`; a value that does not parse is an error rather than a
    /// silent default.
    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Ok(raw) = std::env::var(key) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}"))
    }
}
