//! Enrichment: documents joined with engagement, plus derived signals.

pub mod badges;
pub mod quality;
pub mod row_mapper;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub use badges::Badge;
pub use quality::quality_score;
pub use row_mapper::{map_row, map_rows, server_id};

/// A document with its engagement stats merged in.
///
/// Serializes as one flat object: the document's own keys followed by the
/// identity, engagement, and derived fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedServer {
    /// Percent-encoded name, safe to use as a path segment.
    pub id: String,
    pub name: String,

    #[serde(flatten)]
    pub document: Map<String, Value>,

    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub rating: f64,
    pub rating_count: i64,
    pub installation_count: i64,

    pub quality_score: f64,
    pub badges: Vec<Badge>,
}
