use crate::domain::period::PeriodBuckets;
use crate::domain::transition::UpgradeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
    pub website: Option<String>,
}

/// Which providers contributed to a merged payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Every field came from the primary provider.
    LiveAll,
    /// Quote from the primary provider, at least one field backfilled or missing.
    LivePartial,
    /// Primary quote failed; everything came from a fallback provider.
    FallbackOnly,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::LiveAll => "liveAll",
            Provenance::LivePartial => "livePartial",
            Provenance::FallbackOnly => "fallbackOnly",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "liveAll" => Ok(Provenance::LiveAll),
            "livePartial" => Ok(Provenance::LivePartial),
            "fallbackOnly" => Ok(Provenance::FallbackOnly),
            other => anyhow::bail!("unknown provenance: {other}"),
        }
    }
}

/// Origin of one field in the merged payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "provider", rename_all = "camelCase")]
pub enum FieldSource {
    Primary(String),
    Fallback(String),
    Missing,
}

impl FieldSource {
    pub fn is_primary(&self) -> bool {
        matches!(self, FieldSource::Primary(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSources {
    pub quote: FieldSource,
    pub profile: FieldSource,
    pub recommendation_trend: FieldSource,
    pub upgrade_history: FieldSource,
}

impl FieldSources {
    pub fn all_primary(&self) -> bool {
        self.quote.is_primary()
            && self.profile.is_primary()
            && self.recommendation_trend.is_primary()
            && self.upgrade_history.is_primary()
    }
}

/// Merged upstream data for a symbol; the blob the cache stores. Derived metrics are not part
/// of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPayload {
    pub symbol: String,
    pub quote: Quote,
    pub profile: Option<Profile>,
    pub recommendation_trend: Option<PeriodBuckets>,
    pub upgrade_history: Option<Vec<UpgradeEvent>>,
    pub sources: FieldSources,
}

/// Uppercased, trimmed ticker used as the cache key.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
