use crate::domain::distribution::RatingDistribution;
use crate::domain::rating::{RatingTier, NOT_AVAILABLE};
use serde::{Deserialize, Serialize};

/// Weighted consensus for one distribution. Always recomputed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub score: Option<f64>,
    pub label: String,
    pub total_analysts: u64,
}

impl ConsensusResult {
    pub fn tier(&self) -> Option<RatingTier> {
        self.score.map(tier_for_score)
    }
}

/// `Σ(weight × count) / Σ(count)` with StrongSell = 1 … StrongBuy = 5.
pub fn score(distribution: &RatingDistribution) -> ConsensusResult {
    let total = distribution.total();
    if total == 0 {
        return ConsensusResult {
            score: None,
            label: NOT_AVAILABLE.to_string(),
            total_analysts: 0,
        };
    }

    let weighted: u64 = RatingTier::ALL
        .iter()
        .map(|t| u64::from(t.weight()) * u64::from(distribution.get(*t)))
        .sum();
    let mean = weighted as f64 / total as f64;

    ConsensusResult {
        score: Some(mean),
        label: tier_for_score(mean).label().to_string(),
        total_analysts: total,
    }
}

/// Open lower bounds: a score exactly on a boundary falls into the weaker tier.
pub fn tier_for_score(score: f64) -> RatingTier {
    if score > 4.5 {
        RatingTier::StrongBuy
    } else if score > 3.5 {
        RatingTier::Buy
    } else if score > 2.5 {
        RatingTier::Hold
    } else if score > 1.5 {
        RatingTier::Sell
    } else {
        RatingTier::StrongSell
    }
}

/// Consensus score rescaled onto 0..=100 for gauge visuals.
pub fn gauge_score(score: f64) -> f64 {
    ((score - 1.0) / 4.0 * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GaugeBand {
    StrongSell,
    Sell,
    Neutral,
    Buy,
    StrongBuy,
}

/// Unequal bands for the gauge needle (score cut points 4, 3, 2.5, 2). Display only; the
/// consensus label always comes from [`tier_for_score`].
pub fn gauge_band(gauge: f64) -> GaugeBand {
    if gauge > 75.0 {
        GaugeBand::StrongBuy
    } else if gauge > 50.0 {
        GaugeBand::Buy
    } else if gauge > 37.5 {
        GaugeBand::Neutral
    } else if gauge > 25.0 {
        GaugeBand::Sell
    } else {
        GaugeBand::StrongSell
    }
}
