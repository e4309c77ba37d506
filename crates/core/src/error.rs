use thiserror::Error;

/// Which upstream call a provider failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCall {
    Quote,
    Profile,
    RecommendationTrend,
    UpgradeHistory,
}

impl ProviderCall {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderCall::Quote => "quote",
            ProviderCall::Profile => "profile",
            ProviderCall::RecommendationTrend => "recommendation_trend",
            ProviderCall::UpgradeHistory => "upgrade_history",
        }
    }
}

impl std::fmt::Display for ProviderCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache backing-store failure. Fatal to the request that hit it.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cached payload for {symbol} is unreadable: {source}")]
    Corrupt {
        symbol: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cached row for {symbol}: {detail}")]
    InvalidRow { symbol: String, detail: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// A single upstream call failed or timed out. Recovered by the orchestrator.
    #[error("provider {provider} {call} call failed: {reason}")]
    ProviderUnavailable {
        provider: String,
        call: ProviderCall,
        reason: String,
    },

    /// No provider produced even a quote.
    #[error("no data available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;
