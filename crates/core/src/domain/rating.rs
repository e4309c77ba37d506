use serde::{Deserialize, Serialize};
use std::fmt;

/// Display label used wherever a tier is absent (no coverage, unknown grade).
pub const NOT_AVAILABLE: &str = "N/A";

/// Canonical five-tier analyst rating scale. The discriminant doubles as the scoring weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RatingTier {
    StrongSell = 1,
    Sell = 2,
    Hold = 3,
    Buy = 4,
    StrongBuy = 5,
}

impl RatingTier {
    /// Strongest first, which is the order providers and charts list them in.
    pub const ALL: [RatingTier; 5] = [
        RatingTier::StrongBuy,
        RatingTier::Buy,
        RatingTier::Hold,
        RatingTier::Sell,
        RatingTier::StrongSell,
    ];

    pub fn weight(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            RatingTier::StrongBuy => "Strong Buy",
            RatingTier::Buy => "Buy",
            RatingTier::Hold => "Hold",
            RatingTier::Sell => "Sell",
            RatingTier::StrongSell => "Strong Sell",
        }
    }

    pub fn label_or_na(tier: Option<RatingTier>) -> &'static str {
        tier.map(RatingTier::label).unwrap_or(NOT_AVAILABLE)
    }
}

impl fmt::Display for RatingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Grouped by intent. Keys are compared after lowercasing and collapsing separators, so
// "Equal-Weight", "equal weight" and "EQUAL_WEIGHT" all hit the same row.
const GRADE_TABLE: &[(RatingTier, &[&str])] = &[
    (RatingTier::StrongBuy, &["strong buy", "star performer"]),
    (
        RatingTier::Buy,
        &["buy", "outperform", "accumulate", "overweight", "positive"],
    ),
    (
        RatingTier::Hold,
        &["hold", "neutral", "market perform", "equal weight"],
    ),
    (
        RatingTier::Sell,
        &["sell", "underperform", "reduce", "underweight", "negative"],
    ),
    (RatingTier::StrongSell, &["strong sell"]),
];

fn canonical_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps a free-text analyst grade to a tier.
///
/// Returns `None` for vocabulary outside the table. Callers must keep those out of any
/// weighted score rather than treating them as `Hold`.
pub fn normalize(raw_grade: &str) -> Option<RatingTier> {
    let key = canonical_key(raw_grade);
    if key.is_empty() {
        return None;
    }
    GRADE_TABLE
        .iter()
        .find(|(_, terms)| terms.contains(&key.as_str()))
        .map(|(tier, _)| *tier)
}

/// Rank used when comparing two grades. Unknown vocabulary sits at the neutral midpoint so a
/// comparison always has an answer.
pub fn rank_or_neutral(raw_grade: &str) -> u8 {
    normalize(raw_grade).unwrap_or(RatingTier::Hold).weight()
}
