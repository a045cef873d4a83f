//! Row to enriched record.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::EnrichedServer;
use super::badges::{BadgeSignals, badges_for};
use super::quality::quality_score;
use crate::error::{CatalogError, CatalogResult};
use crate::models::ServerRow;

/// Keys owned by the enriched record; same-named document keys are dropped.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "name",
    "published_at",
    "updated_at",
    "rating",
    "rating_count",
    "installation_count",
    "quality_score",
    "badges",
];

/// Stable public id for a document name.
pub fn server_id(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Parse and enrich one row.
///
/// A document that is not a JSON object fails with [`CatalogError::Decode`].
pub fn map_row(row: ServerRow, now: DateTime<Utc>) -> CatalogResult<EnrichedServer> {
    let mut document = parse_document(&row.name, &row.value)?;
    for key in RESERVED_KEYS {
        document.remove(*key);
    }

    let signals = BadgeSignals {
        rating: row.rating,
        rating_count: row.rating_count,
        installation_count: row.installation_count,
        published_at: row.published_at,
    };

    Ok(EnrichedServer {
        id: server_id(&row.name),
        quality_score: quality_score(row.rating, row.rating_count, row.installation_count),
        badges: badges_for(&signals, now),
        name: row.name,
        published_at: row.published_at,
        updated_at: row.updated_at,
        rating: row.rating,
        rating_count: row.rating_count,
        installation_count: row.installation_count,
        document,
    })
}

/// Enrich every row; the first malformed row fails the whole batch.
pub fn map_rows(rows: Vec<ServerRow>, now: DateTime<Utc>) -> CatalogResult<Vec<EnrichedServer>> {
    rows.into_iter().map(|row| map_row(row, now)).collect()
}

fn parse_document(name: &str, raw: &str) -> CatalogResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CatalogError::Decode {
            name: name.to_string(),
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(e) => Err(CatalogError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
