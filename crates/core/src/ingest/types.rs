use crate::domain::distribution::RatingDistribution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub symbol: String,
    pub items: Vec<T>,
}

/// One recommendation-trend snapshot as a provider reports it. `period` is still raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub period: String,
    #[serde(flatten)]
    pub counts: RatingDistribution,
}

/// One upgrade/downgrade history row, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRow {
    pub firm: String,
    #[serde(default)]
    pub from_grade: Option<String>,
    pub to_grade: String,
    #[serde(default)]
    pub action: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
