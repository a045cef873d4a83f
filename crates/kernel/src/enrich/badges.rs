//! Engagement badges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A named achievement derived from engagement and recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    TopRated,
    HighlyReviewed,
    Popular,
    Trending,
    New,
}

/// Inputs to the badge rules.
#[derive(Debug, Clone, Copy)]
pub struct BadgeSignals {
    pub rating: f64,
    pub rating_count: i64,
    pub installation_count: i64,
    pub published_at: DateTime<Utc>,
}

type Rule = fn(&BadgeSignals, DateTime<Utc>) -> bool;

/// Rules in emission order.
const RULES: &[(Badge, Rule)] = &[
    (Badge::TopRated, |s, _| s.rating >= 4.5 && s.rating_count >= 5),
    (Badge::HighlyReviewed, |s, _| s.rating_count >= 50),
    (Badge::Popular, |s, _| s.installation_count >= 1000),
    (Badge::Trending, |s, now| {
        s.installation_count >= 100 && published_within(s, now, 30)
    }),
    (Badge::New, |s, now| published_within(s, now, 14)),
];

fn published_within(signals: &BadgeSignals, now: DateTime<Utc>, days: i64) -> bool {
    now.signed_duration_since(signals.published_at) <= Duration::days(days)
}

/// Evaluate every rule against `signals` as of `now`.
pub fn badges_for(signals: &BadgeSignals, now: DateTime<Utc>) -> Vec<Badge> {
    RULES
        .iter()
        .filter(|(_, rule)| rule(signals, now))
        .map(|(badge, _)| *badge)
        .collect()
}
