use crate::domain::distribution::RatingDistribution;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Relative month bucket such as `"0m"` (current) or `"-2m"` (two months ago).
///
/// Ordering is numeric on the offset with the current month first, so `-10m` sorts after
/// `-2m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    offset: i32,
}

impl PeriodKey {
    pub const CURRENT: PeriodKey = PeriodKey { offset: 0 };

    pub fn months_ago(n: u32) -> Self {
        Self {
            offset: -(n.min(i32::MAX as u32) as i32),
        }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }
}

impl Ord for PeriodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.offset.cmp(&self.offset)
    }
}

impl PartialOrd for PeriodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid period key: {0:?}")]
pub struct InvalidPeriodKey(pub String);

impl FromStr for PeriodKey {
    type Err = InvalidPeriodKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t
            .strip_suffix('m')
            .or_else(|| t.strip_suffix('M'))
            .ok_or_else(|| InvalidPeriodKey(s.to_string()))?;
        let offset = digits
            .parse::<i32>()
            .map_err(|_| InvalidPeriodKey(s.to_string()))?;
        // Buckets only ever look back from the current month.
        if offset > 0 {
            return Err(InvalidPeriodKey(s.to_string()));
        }
        Ok(Self { offset })
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.offset)
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Distribution snapshots keyed by relative month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodBuckets {
    by_period: BTreeMap<PeriodKey, RatingDistribution>,
}

impl PeriodBuckets {
    /// Later snapshots for an already-seen key replace earlier ones.
    pub fn bucket<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = (PeriodKey, RatingDistribution)>,
    {
        Self {
            by_period: snapshots.into_iter().collect(),
        }
    }

    /// Keys in display order: current month first, then increasingly older.
    pub fn periods(&self) -> Vec<PeriodKey> {
        self.by_period.keys().copied().collect()
    }

    pub fn get(&self, period: PeriodKey) -> Option<&RatingDistribution> {
        self.by_period.get(&period)
    }

    /// Falls back to the current month, then to an all-zero distribution.
    pub fn select(&self, period: PeriodKey) -> RatingDistribution {
        self.by_period
            .get(&period)
            .or_else(|| self.by_period.get(&PeriodKey::CURRENT))
            .copied()
            .unwrap_or_else(RatingDistribution::zero)
    }

    pub fn current(&self) -> RatingDistribution {
        self.select(PeriodKey::CURRENT)
    }

    pub fn is_empty(&self) -> bool {
        self.by_period.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_period.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, &RatingDistribution)> {
        self.by_period.iter()
    }
}
