#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] drives the real router and catalog service. HTTP tests run it
//! over [`MemoryStore`]; PostgreSQL tests get a pool from [`pg_pool`], which
//! returns `None` (and the test skips) when no database is reachable.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use sea_query::Value;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use curato_kernel::cache::EnrichedCache;
use curato_kernel::config::{CacheConfig, QueryConfig};
use curato_kernel::error::{CatalogError, CatalogResult};
use curato_kernel::models::{EngagementAggregate, NewInstall, NewRating, ServerRow};
use curato_kernel::query::BoundQuery;
use curato_kernel::routes;
use curato_kernel::services::CatalogService;
use curato_kernel::state::AppState;
use curato_kernel::store::CatalogStore;

/// In-memory store: returns every document for listings and keeps
/// per-user ratings and installs.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<(String, String, DateTime<Utc>)>>,
    ratings: Mutex<HashMap<(String, String), i16>>,
    installs: Mutex<HashMap<(String, String), NewInstall>>,
    pub queries: Mutex<Vec<BoundQuery>>,
}

impl MemoryStore {
    pub fn add(&self, name: &str, document: JsonValue, published_at: DateTime<Utc>) {
        self.documents
            .lock()
            .push((name.to_string(), document.to_string(), published_at));
    }

    pub fn add_raw(&self, name: &str, raw: &str, published_at: DateTime<Utc>) {
        self.documents
            .lock()
            .push((name.to_string(), raw.to_string(), published_at));
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    fn exists(&self, name: &str) -> bool {
        self.documents.lock().iter().any(|(n, _, _)| n == name)
    }

    fn aggregate(&self, name: &str) -> EngagementAggregate {
        let ratings: Vec<i16> = self
            .ratings
            .lock()
            .iter()
            .filter(|((doc, _), _)| doc == name)
            .map(|(_, r)| *r)
            .collect();
        let installs = self
            .installs
            .lock()
            .keys()
            .filter(|(doc, _)| doc == name)
            .count();

        let mut aggregate = EngagementAggregate::empty(name);
        if !ratings.is_empty() {
            aggregate.rating =
                ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64;
            aggregate.rating_count = ratings.len() as i64;
            aggregate.updated_at = Some(Utc::now());
        }
        aggregate.installation_count = installs as i64;
        aggregate
    }

    fn row(&self, name: &str, value: &str, published_at: DateTime<Utc>, total: i64) -> ServerRow {
        let aggregate = self.aggregate(name);
        ServerRow {
            name: name.to_string(),
            value: value.to_string(),
            published_at,
            updated_at: published_at,
            rating: aggregate.rating,
            rating_count: aggregate.rating_count,
            installation_count: aggregate.installation_count,
            total_count: Some(total),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fetch_rows(&self, query: &BoundQuery) -> CatalogResult<Vec<ServerRow>> {
        self.queries.lock().push(query.clone());
        let documents = self.documents.lock().clone();

        // Lookup statements bind the name first.
        let wanted = if query.sql.contains("d.name = $1") {
            match query.values.first() {
                Some(Value::String(Some(name))) => Some(name.as_ref().clone()),
                _ => None,
            }
        } else {
            None
        };

        let mut selected: Vec<_> = documents
            .iter()
            .filter(|(name, _, _)| wanted.as_ref().is_none_or(|w| w == name))
            .collect();
        selected.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

        let total = selected.len() as i64;
        Ok(selected
            .into_iter()
            .map(|(name, value, published)| self.row(name, value, *published, total))
            .collect())
    }

    async fn fetch_count(&self, query: &BoundQuery) -> CatalogResult<i64> {
        self.queries.lock().push(query.clone());
        Ok(self.documents.lock().len() as i64)
    }

    async fn engagement(&self, name: &str) -> CatalogResult<EngagementAggregate> {
        if !self.exists(name) {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        Ok(self.aggregate(name))
    }

    async fn submit_rating(
        &self,
        name: &str,
        user_id: &str,
        rating: &NewRating,
    ) -> CatalogResult<EngagementAggregate> {
        if !self.exists(name) {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        self.ratings
            .lock()
            .insert((name.to_string(), user_id.to_string()), rating.rating);
        Ok(self.aggregate(name))
    }

    async fn record_install(
        &self,
        name: &str,
        user_id: &str,
        install: &NewInstall,
    ) -> CatalogResult<EngagementAggregate> {
        if !self.exists(name) {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        self.installs
            .lock()
            .insert((name.to_string(), user_id.to_string()), install.clone());
        Ok(self.aggregate(name))
    }

    async fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Test application wrapper using the real routes and catalog service.
pub struct TestApp {
    router: Router,
    pub catalog: CatalogService,
}

impl TestApp {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        let catalog = CatalogService::new(
            store,
            EnrichedCache::new(CacheConfig::default()),
            QueryConfig::default(),
        );
        let router = routes::app(AppState::from_service(catalog.clone()));
        Self { router, catalog }
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, JsonValue) {
        self.request("GET", uri, None, None).await
    }
}

/// Connect to `DATABASE_URL`, migrate, and clear all rows.
///
/// Returns `None` when the variable is unset or the database is unreachable.
pub async fn pg_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping pg tests: set DATABASE_URL");
        return None;
    };

    let connect = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(2))
        .connect(&url);
    let pool = match tokio::time::timeout(Duration::from_secs(3), connect).await {
        Ok(Ok(pool)) => pool,
        Ok(Err(err)) => {
            eprintln!("skipping pg tests: cannot connect to postgres: {err}");
            return None;
        }
        Err(_) => {
            eprintln!("skipping pg tests: postgres connect timed out");
            return None;
        }
    };

    curato_kernel::db::run_migrations(&pool)
        .await
        .expect("migrations should apply");
    curato_test_utils::reset(&pool)
        .await
        .expect("tables should truncate");
    Some(pool)
}

/// Serializes PostgreSQL tests; they share one database and truncate it.
pub static PG_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
