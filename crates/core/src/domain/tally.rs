use crate::domain::distribution::RatingDistribution;
use crate::domain::rating::normalize;
use crate::domain::transition::UpgradeEvent;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Current grade per firm, normalized into a distribution. Grades outside the vocabulary are
/// kept aside in `unrecognized` and contribute nothing to `distribution`. Runs on every report,
/// so it stays silent; gaps are logged once when history is ingested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeTally {
    pub distribution: RatingDistribution,
    pub unrecognized: BTreeSet<String>,
    pub firms: usize,
}

/// `events` must already be newest first; the first row seen for a firm wins.
pub fn latest_grade_per_firm(events: &[UpgradeEvent], since: Option<DateTime<Utc>>) -> GradeTally {
    let mut seen = HashSet::new();
    let mut out = GradeTally::default();

    for ev in events {
        if since.is_some_and(|cutoff| ev.occurred_at < cutoff) {
            continue;
        }
        let firm_key = ev.firm.trim().to_lowercase();
        if firm_key.is_empty() || !seen.insert(firm_key) {
            continue;
        }
        out.firms += 1;

        match normalize(&ev.to_grade) {
            Some(tier) => out.distribution.add(tier, 1),
            None => {
                out.unrecognized.insert(ev.to_grade.trim().to_string());
            }
        }
    }

    out
}
