//! Catalog persistence.
//!
//! [`CatalogStore`] is the seam between the catalog service and the
//! database: it executes compiled listing statements and owns the
//! engagement write path. [`postgres::PgCatalogStore`] is the production
//! implementation.

pub mod postgres;

use async_trait::async_trait;

use crate::error::CatalogResult;
use crate::models::{EngagementAggregate, NewInstall, NewRating, ServerRow};
use crate::query::BoundQuery;

pub use postgres::PgCatalogStore;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Run a row-returning statement from the plan builder.
    async fn fetch_rows(&self, query: &BoundQuery) -> CatalogResult<Vec<ServerRow>>;

    /// Run a single-count statement from the plan builder.
    async fn fetch_count(&self, query: &BoundQuery) -> CatalogResult<i64>;

    /// Aggregate for a latest document; zeros when it has no engagement.
    ///
    /// Fails with `NotFound` when no latest document has this name.
    async fn engagement(&self, name: &str) -> CatalogResult<EngagementAggregate>;

    /// Upsert the user's rating and recompute the aggregate, atomically.
    async fn submit_rating(
        &self,
        name: &str,
        user_id: &str,
        rating: &NewRating,
    ) -> CatalogResult<EngagementAggregate>;

    /// Upsert the user's install and recompute the aggregate, atomically.
    async fn record_install(
        &self,
        name: &str,
        user_id: &str,
        install: &NewInstall,
    ) -> CatalogResult<EngagementAggregate>;

    /// Cheap connectivity check.
    async fn ping(&self) -> CatalogResult<()>;
}
