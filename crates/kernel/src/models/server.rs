//! Raw listing row.

use chrono::{DateTime, Utc};

/// One row from a listing, lookup, or collection query: the document text
/// joined with its engagement aggregate.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ServerRow {
    /// Document key.
    pub name: String,

    /// Document JSON as text.
    pub value: String,

    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Average rating, 0 without ratings.
    pub rating: f64,

    pub rating_count: i64,
    pub installation_count: i64,

    /// `COUNT(*) OVER()` for the matching set.
    pub total_count: Option<i64>,
}
