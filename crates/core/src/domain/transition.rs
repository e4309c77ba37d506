use crate::domain::rating::rank_or_neutral;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown as the prior grade when a firm initiates coverage.
pub const NEW_COVERAGE: &str = "New Coverage";

/// Outcome of a rating change. Provider labels "reiterated"/"reiterate"/"main" all collapse
/// into `Maintain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Upgrade,
    Downgrade,
    Maintain,
    Init,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Upgrade => "upgrade",
            ActionType::Downgrade => "downgrade",
            ActionType::Maintain => "maintain",
            ActionType::Init => "init",
        }
    }

    /// Parses the action vocabulary providers attach to history rows.
    pub fn from_provider_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" | "upgrade" => Some(ActionType::Upgrade),
            "down" | "downgrade" => Some(ActionType::Downgrade),
            "main" | "maintain" | "reiterated" | "reiterate" | "reit" => Some(ActionType::Maintain),
            "init" | "initiated" | "initiate" => Some(ActionType::Init),
            _ => None,
        }
    }
}

/// Total over its inputs: every pair yields exactly one action.
pub fn classify(from_grade: Option<&str>, to_grade: &str) -> ActionType {
    let Some(from) = from_grade.map(str::trim).filter(|s| !s.is_empty()) else {
        return ActionType::Init;
    };

    if from.eq_ignore_ascii_case(to_grade.trim()) {
        return ActionType::Maintain;
    }

    let (from_rank, to_rank) = (rank_or_neutral(from), rank_or_neutral(to_grade));
    match to_rank.cmp(&from_rank) {
        std::cmp::Ordering::Greater => ActionType::Upgrade,
        std::cmp::Ordering::Less => ActionType::Downgrade,
        std::cmp::Ordering::Equal => ActionType::Maintain,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeEvent {
    pub firm: String,
    pub from_grade: String,
    pub to_grade: String,
    pub action_type: ActionType,
    pub occurred_at: DateTime<Utc>,
}

impl UpgradeEvent {
    pub fn new(
        firm: impl Into<String>,
        from_grade: Option<&str>,
        to_grade: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let to_grade = to_grade.into();
        let action_type = classify(from_grade, &to_grade);
        let from_grade = from_grade
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NEW_COVERAGE)
            .to_string();
        Self {
            firm: firm.into(),
            from_grade,
            to_grade,
            action_type,
            occurred_at,
        }
    }
}

/// Newest first. Stable, so equal timestamps keep their input order.
pub fn sort_newest_first(events: &mut [UpgradeEvent]) {
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
}
