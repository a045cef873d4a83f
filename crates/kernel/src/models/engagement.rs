//! Engagement aggregate and the events that feed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Longest accepted rating comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Longest accepted caller identity, in bytes.
pub const MAX_USER_ID_LEN: usize = 255;

/// Per-document engagement summary, recomputed from the event tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EngagementAggregate {
    /// Document name.
    pub document_id: String,

    /// Average rating over current per-user ratings, 0 when none.
    pub rating: f64,

    /// Number of users with a current rating.
    pub rating_count: i64,

    /// Number of distinct installing users.
    pub installation_count: i64,

    /// Last recompute. `None` when no event was ever recorded.
    pub updated_at: Option<DateTime<Utc>>,
}

impl EngagementAggregate {
    /// The aggregate of a document nobody has rated or installed.
    pub fn empty(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            rating: 0.0,
            rating_count: 0,
            installation_count: 0,
            updated_at: None,
        }
    }
}

/// A rating submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRating {
    pub rating: i16,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewRating {
    /// Reject out-of-range ratings and oversized comments; blank comments
    /// become `None`.
    pub fn validated(self) -> CatalogResult<Self> {
        if !(1..=5).contains(&self.rating) {
            return Err(CatalogError::validation("rating must be between 1 and 5"));
        }

        let comment = self
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(ref c) = comment
            && c.chars().count() > MAX_COMMENT_CHARS
        {
            return Err(CatalogError::validation(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        Ok(Self {
            rating: self.rating,
            comment,
        })
    }
}

/// An install event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInstall {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Trim and check a caller identity.
pub fn validate_user_id(user_id: &str) -> CatalogResult<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CatalogError::validation("user id is required"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(CatalogError::validation(format!(
            "user id must be at most {MAX_USER_ID_LEN} bytes"
        )));
    }
    Ok(user_id)
}
