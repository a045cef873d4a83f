//! Curato test utilities.
//!
//! Helpers for integration testing: registry document fixtures,
//! engagement seeding, and JSON assertions.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value as JsonValue, json};
use sqlx::PgPool;

/// Create a test server document with default values.
pub fn test_server(name: &str) -> TestServer {
    TestServer {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        value: json!({
            "description": format!("{name} test server"),
            "version": "1.0.0",
        }),
        published_at: Utc::now() - Duration::days(365),
        is_latest: true,
        engagement: None,
    }
}

/// Engagement totals written straight into `engagement_aggregate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestEngagement {
    pub rating: f64,
    pub rating_count: i64,
    pub installation_count: i64,
}

/// A registry document builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestServer {
    pub name: String,
    pub version: String,
    pub value: JsonValue,
    pub published_at: DateTime<Utc>,
    pub is_latest: bool,
    pub engagement: Option<TestEngagement>,
}

impl TestServer {
    /// Set the version, in the row and in the document.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self.with_field("version", json!(version))
    }

    /// Add a single top-level document field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        if let Some(obj) = self.value.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    /// Replace the whole document.
    pub fn with_document(mut self, value: JsonValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_description(self, description: &str) -> Self {
        self.with_field("description", json!(description))
    }

    pub fn with_category(self, category: &str) -> Self {
        self.with_field("category", json!(category))
    }

    pub fn with_tags(self, tags: &[&str]) -> Self {
        self.with_field("tags", json!(tags))
    }

    /// Append a package descriptor.
    pub fn with_package(mut self, registry_type: &str, transport: &str) -> Self {
        let package = json!({
            "registryType": registry_type,
            "identifier": self.name,
            "transport": { "type": transport },
        });
        push_to_array(&mut self.value, "packages", package);
        self
    }

    /// Append a hosted remote.
    pub fn with_remote(mut self, transport: &str, url: &str) -> Self {
        push_to_array(&mut self.value, "remotes", json!({ "type": transport, "url": url }));
        self
    }

    /// Set the publish date relative to now.
    pub fn published_days_ago(mut self, days: i64) -> Self {
        self.published_at = Utc::now() - Duration::days(days);
        self
    }

    /// Store as a superseded version.
    pub fn not_latest(mut self) -> Self {
        self.is_latest = false;
        self
    }

    /// Attach an engagement aggregate.
    pub fn with_engagement(mut self, rating: f64, rating_count: i64, installation_count: i64) -> Self {
        self.engagement = Some(TestEngagement {
            rating,
            rating_count,
            installation_count,
        });
        self
    }

    /// Insert the document, and its aggregate if any.
    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO documents (name, version, value, published_at, updated_at, is_latest) \
             VALUES ($1, $2, $3, $4, $4, $5)",
        )
        .bind(&self.name)
        .bind(&self.version)
        .bind(&self.value)
        .bind(self.published_at)
        .bind(self.is_latest)
        .execute(pool)
        .await?;

        if let Some(engagement) = self.engagement {
            sqlx::query(
                "INSERT INTO engagement_aggregate (document_id, rating, rating_count, installation_count) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (document_id) DO UPDATE SET \
                     rating = EXCLUDED.rating, \
                     rating_count = EXCLUDED.rating_count, \
                     installation_count = EXCLUDED.installation_count",
            )
            .bind(&self.name)
            .bind(engagement.rating)
            .bind(engagement.rating_count)
            .bind(engagement.installation_count)
            .execute(pool)
            .await?;
        }

        Ok(())
    }
}

fn push_to_array(value: &mut JsonValue, key: &str, item: JsonValue) {
    if let Some(obj) = value.as_object_mut() {
        let entry = obj.entry(key.to_string()).or_insert_with(|| json!([]));
        if let Some(items) = entry.as_array_mut() {
            items.push(item);
        }
    }
}

/// Insert every fixture in order.
pub async fn insert_all(pool: &PgPool, servers: &[TestServer]) -> Result<(), sqlx::Error> {
    for server in servers {
        server.insert(pool).await?;
    }
    Ok(())
}

/// Remove all documents and engagement rows.
pub async fn reset(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "TRUNCATE documents, rating_events, install_events, engagement_aggregate RESTART IDENTITY",
    )
    .execute(pool)
    .await
    .map(|_| ())
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that `items` are ordered by the numeric field `key`.
    pub fn ordered_by(items: &[Value], key: &str, descending: bool) {
        for pair in items.windows(2) {
            let a = pair[0][key].as_f64().unwrap_or_default();
            let b = pair[1][key].as_f64().unwrap_or_default();
            let ok = if descending { a >= b } else { a <= b };
            assert!(ok, "'{key}' out of order: {a} then {b}");
        }
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_appends_packages_and_remotes() {
        let server = test_server("io.example/files")
            .with_package("npm", "stdio")
            .with_package("pypi", "stdio")
            .with_remote("sse", "https://files.example/sse");

        assert_eq!(server.value["packages"].as_array().map(Vec::len), Some(2));
        assert_eq!(server.value["packages"][0]["registryType"], "npm");
        assert_eq!(server.value["remotes"][0]["type"], "sse");
    }

    #[test]
    fn defaults_are_latest_without_engagement() {
        let server = test_server("a");
        assert!(server.is_latest);
        assert!(server.engagement.is_none());
        assert_eq!(server.value["description"], "a test server");
    }
}
