//! Client-supplied listing filter.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Pseudo registry type matching servers that expose a hosted remote.
pub const REMOTE_REGISTRY_TYPE: &str = "remote";

/// Remote transports that satisfy the [`REMOTE_REGISTRY_TYPE`] filter.
pub const REMOTE_TRANSPORTS: &[&str] = &["streamable-http", "sse"];

/// Highest average rating a server can have.
pub const MAX_RATING: f64 = 5.0;

/// Restrictions applied to a server listing.
///
/// Every field is optional; the default filter restricts nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerFilter {
    /// Case-insensitive substring of the name or description.
    #[serde(default)]
    pub search: Option<String>,

    /// Exact category.
    #[serde(default)]
    pub category: Option<String>,

    /// Any-of tag set.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Minimum average rating (servers without ratings count as 0).
    #[serde(default)]
    pub min_rating: Option<f64>,

    /// Minimum distinct installs (servers without installs count as 0).
    #[serde(default)]
    pub min_installs: Option<i64>,

    /// Any-of package registry types, plus the `remote` pseudo type.
    #[serde(default)]
    pub registry_types: Vec<String>,

    /// Any-of package transport types.
    #[serde(default)]
    pub transport_types: Vec<String>,
}

impl ServerFilter {
    /// Whether this filter adds no predicate at all.
    pub fn is_unrestricted(&self) -> bool {
        self.search_term().is_none()
            && self.category_value().is_none()
            && self.tag_values().is_empty()
            && self.min_rating.is_none()
            && self.min_installs.is_none()
            && self.registry_type_values().is_empty()
            && self.transport_type_values().is_empty()
    }

    /// Check thresholds before any I/O.
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(rating) = self.min_rating
            && !(rating.is_finite() && (0.0..=MAX_RATING).contains(&rating))
        {
            return Err(CatalogError::validation(format!(
                "min_rating must be between 0 and {MAX_RATING}"
            )));
        }
        if let Some(installs) = self.min_installs
            && installs < 0
        {
            return Err(CatalogError::validation("min_installs must be >= 0"));
        }
        Ok(())
    }

    /// Trimmed search text, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }

    /// Trimmed category, or `None` when blank.
    pub fn category_value(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    /// Non-blank tags, trimmed.
    pub fn tag_values(&self) -> Vec<String> {
        clean_list(&self.tags)
    }

    /// Non-blank registry types, trimmed.
    pub fn registry_type_values(&self) -> Vec<String> {
        clean_list(&self.registry_types)
    }

    /// Non-blank transport types, trimmed.
    pub fn transport_type_values(&self) -> Vec<String> {
        clean_list(&self.transport_types)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn clean_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Split a comma-separated query parameter into a list.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
