use crate::domain::rating::RatingTier;
use serde::{Deserialize, Serialize};

/// Analyst counts per tier for one snapshot. Every tier is always present; a missing tier on
/// the wire deserializes as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingDistribution {
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
}

/// Share of analysts per tier in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPercentages {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
    pub strong_sell: f64,
}

impl RatingDistribution {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, tier: RatingTier) -> u32 {
        match tier {
            RatingTier::StrongBuy => self.strong_buy,
            RatingTier::Buy => self.buy,
            RatingTier::Hold => self.hold,
            RatingTier::Sell => self.sell,
            RatingTier::StrongSell => self.strong_sell,
        }
    }

    pub fn add(&mut self, tier: RatingTier, n: u32) {
        let slot = match tier {
            RatingTier::StrongBuy => &mut self.strong_buy,
            RatingTier::Buy => &mut self.buy,
            RatingTier::Hold => &mut self.hold,
            RatingTier::Sell => &mut self.sell,
            RatingTier::StrongSell => &mut self.strong_sell,
        };
        *slot = slot.saturating_add(n);
    }

    /// Summed in `u64`; five `u32` counts cannot overflow it.
    pub fn total(&self) -> u64 {
        RatingTier::ALL.iter().map(|t| u64::from(self.get(*t))).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// `None` when there is no coverage; a zero total is never divided into.
    pub fn percentages(&self) -> Option<TierPercentages> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let pct = |tier| f64::from(self.get(tier)) * 100.0 / total as f64;
        Some(TierPercentages {
            strong_buy: pct(RatingTier::StrongBuy),
            buy: pct(RatingTier::Buy),
            hold: pct(RatingTier::Hold),
            sell: pct(RatingTier::Sell),
            strong_sell: pct(RatingTier::StrongSell),
        })
    }
}

impl FromIterator<(RatingTier, u32)> for RatingDistribution {
    fn from_iter<I: IntoIterator<Item = (RatingTier, u32)>>(iter: I) -> Self {
        let mut out = Self::zero();
        for (tier, n) in iter {
            out.add(tier, n);
        }
        out
    }
}

impl TierPercentages {
    pub fn sum(&self) -> f64 {
        self.strong_buy + self.buy + self.hold + self.sell + self.strong_sell
    }
}
