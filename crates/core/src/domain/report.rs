use crate::domain::consensus::{gauge_band, gauge_score, score, GaugeBand};
use crate::domain::distribution::{RatingDistribution, TierPercentages};
use crate::domain::payload::{AggregatedPayload, FieldSources, Profile, Provenance, Quote};
use crate::domain::period::PeriodBuckets;
use crate::domain::tally::latest_grade_per_firm;
use crate::domain::transition::{sort_newest_first, UpgradeEvent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Firms whose latest action is older than this do not count toward the implied distribution.
const IMPLIED_LOOKBACK_DAYS: i64 = 365;

/// Caller-facing response for one symbol. Every key is always present; absent data is `null`
/// or an empty collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReport {
    pub symbol: String,
    pub consensus_key: String,
    pub consensus_mean: Option<f64>,
    pub number_of_analysts: u64,
    pub gauge_score: Option<f64>,
    pub gauge_band: Option<GaugeBand>,
    pub current_percentages: Option<TierPercentages>,
    pub distribution_over_time: PeriodBuckets,
    pub rating_history: Vec<UpgradeEvent>,
    pub implied_distribution: RatingDistribution,
    pub unrecognized_grades: Vec<String>,
    pub quote: Quote,
    pub profile: Option<Profile>,
    pub provenance: Provenance,
    pub field_sources: FieldSources,
    pub updated_at: DateTime<Utc>,
    pub age_seconds: i64,
    pub from_cache: bool,
    pub stale: bool,
}

/// How the payload reached the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub provenance: Provenance,
    pub updated_at: DateTime<Utc>,
    pub from_cache: bool,
    pub stale: bool,
}

pub fn build_report(payload: &AggregatedPayload, delivery: Delivery, now: DateTime<Utc>) -> SymbolReport {
    let trend = payload.recommendation_trend.clone().unwrap_or_default();
    let current = trend.current();
    let consensus = score(&current);
    let gauge = consensus.score.map(gauge_score);

    let mut history = payload.upgrade_history.clone().unwrap_or_default();
    sort_newest_first(&mut history);
    let tally = latest_grade_per_firm(&history, Some(now - Duration::days(IMPLIED_LOOKBACK_DAYS)));

    SymbolReport {
        symbol: payload.symbol.clone(),
        consensus_key: consensus.label,
        consensus_mean: consensus.score,
        number_of_analysts: consensus.total_analysts,
        gauge_score: gauge,
        gauge_band: gauge.map(gauge_band),
        current_percentages: current.percentages(),
        distribution_over_time: trend,
        rating_history: history,
        implied_distribution: tally.distribution,
        unrecognized_grades: tally.unrecognized.into_iter().collect(),
        quote: payload.quote.clone(),
        profile: payload.profile.clone(),
        provenance: delivery.provenance,
        field_sources: payload.sources.clone(),
        updated_at: delivery.updated_at,
        age_seconds: (now - delivery.updated_at).num_seconds().max(0),
        from_cache: delivery.from_cache,
        stale: delivery.stale,
    }
}
