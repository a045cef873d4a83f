//! Catalog service: enriched listings, lookups, and engagement writes.
//!
//! Listings are pushed down to the database. The one exception is the
//! unfiltered listing in the default order, which is sliced from the cached
//! enriched collection. Every committed engagement write clears that cache.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::EnrichedCache;
use crate::config::QueryConfig;
use crate::enrich::{EnrichedServer, map_row, map_rows};
use crate::error::{CatalogError, CatalogResult};
use crate::models::engagement::validate_user_id;
use crate::models::{EngagementAggregate, NewInstall, NewRating};
use crate::query::{ServerFilter, build_collection, build_listing, build_lookup, sort};
use crate::store::CatalogStore;

/// A listing request as received from the client.
#[derive(Debug, Clone, Default)]
pub struct ListingRequest {
    pub filter: ServerFilter,
    /// Sort token; blank means the default order.
    pub sort: String,
    /// Page size; `None` means the configured default.
    pub limit: Option<u64>,
    pub offset: u64,
}

/// One page of enriched servers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerPage {
    pub servers: Vec<EnrichedServer>,
    /// Number of servers matching the filter, across all pages.
    pub total: i64,
    /// Effective page size after clamping.
    pub limit: u64,
    pub offset: u64,
}

/// Catalog operations over a [`CatalogStore`] and the enriched cache.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: EnrichedCache,
    query: QueryConfig,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: EnrichedCache, query: QueryConfig) -> Self {
        Self {
            store,
            cache,
            query,
        }
    }

    pub fn cache(&self) -> &EnrichedCache {
        &self.cache
    }

    /// Apply the default and the `1..=max_limit` clamp.
    pub fn clamp_limit(&self, limit: Option<u64>) -> u64 {
        limit
            .unwrap_or(self.query.default_limit)
            .clamp(1, self.query.max_limit)
    }

    /// Filtered, sorted, paginated enriched servers with the total match count.
    pub async fn query_enriched(&self, request: &ListingRequest) -> CatalogResult<ServerPage> {
        request.filter.validate()?;
        let order = sort::resolve(&request.sort)?;
        let limit = self.clamp_limit(request.limit);
        let offset = request.offset;

        if request.filter.is_unrestricted() && order.is_default() {
            let all = self.collection().await?;
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            let take = usize::try_from(limit).unwrap_or(usize::MAX);
            return Ok(ServerPage {
                servers: all.iter().skip(start).take(take).cloned().collect(),
                total: i64::try_from(all.len()).unwrap_or(i64::MAX),
                limit,
                offset,
            });
        }

        let plan = build_listing(&request.filter, &request.sort, limit, offset)?;
        let rows = self.with_deadline(self.store.fetch_rows(&plan.page)).await?;

        let total = match rows.first().and_then(|row| row.total_count) {
            Some(total) => total,
            None if offset > 0 => {
                debug!(offset, "empty page past the start, counting matches");
                self.with_deadline(self.store.fetch_count(&plan.count)).await?
            }
            None => 0,
        };

        Ok(ServerPage {
            servers: map_rows(rows, Utc::now())?,
            total,
            limit,
            offset,
        })
    }

    /// One enriched server by its public id (the percent-encoded name).
    pub async fn get_enriched(&self, id: &str) -> CatalogResult<EnrichedServer> {
        let name = decode_id(id)?;
        let rows = self
            .with_deadline(self.store.fetch_rows(&build_lookup(&name)))
            .await?;

        match rows.into_iter().next() {
            Some(row) => map_row(row, Utc::now()),
            None => Err(CatalogError::NotFound(name)),
        }
    }

    /// Engagement aggregate for a server, zeros when it has none.
    pub async fn engagement_for(&self, id: &str) -> CatalogResult<EngagementAggregate> {
        let name = decode_id(id)?;
        self.with_deadline(self.store.engagement(&name)).await
    }

    /// Recompute the enriched collection and replace the cached entry.
    ///
    /// Returns the number of servers cached.
    pub async fn refresh(&self) -> CatalogResult<usize> {
        let servers = self.load_collection().await?;
        let count = servers.len();
        self.cache.set(servers);
        info!(servers = count, "enriched cache refreshed");
        Ok(count)
    }

    /// Record the caller's rating and return the recomputed aggregate.
    pub async fn submit_rating(
        &self,
        id: &str,
        user_id: &str,
        rating: NewRating,
    ) -> CatalogResult<EngagementAggregate> {
        let user_id = validate_user_id(user_id)?;
        let rating = rating.validated()?;
        let name = decode_id(id)?;

        let aggregate = self
            .with_deadline(self.store.submit_rating(&name, user_id, &rating))
            .await?;
        self.cache.clear();

        info!(
            server = %name,
            rating = rating.rating,
            average = aggregate.rating,
            rating_count = aggregate.rating_count,
            "rating submitted"
        );
        Ok(aggregate)
    }

    /// Record the caller's install and return the recomputed aggregate.
    pub async fn record_install(
        &self,
        id: &str,
        user_id: &str,
        install: NewInstall,
    ) -> CatalogResult<EngagementAggregate> {
        let user_id = validate_user_id(user_id)?;
        let name = decode_id(id)?;

        let aggregate = self
            .with_deadline(self.store.record_install(&name, user_id, &install))
            .await?;
        self.cache.clear();

        info!(
            server = %name,
            installation_count = aggregate.installation_count,
            "install recorded"
        );
        Ok(aggregate)
    }

    /// Whether the store answers.
    pub async fn is_healthy(&self) -> bool {
        self.with_deadline(self.store.ping()).await.is_ok()
    }

    /// Cached collection, loading it on a miss.
    async fn collection(&self) -> CatalogResult<Arc<Vec<EnrichedServer>>> {
        if let Some(servers) = self.cache.get() {
            return Ok(servers);
        }
        let servers = self.load_collection().await?;
        Ok(self.cache.set(servers))
    }

    async fn load_collection(&self) -> CatalogResult<Vec<EnrichedServer>> {
        let query = build_collection()?;
        let rows = self.with_deadline(self.store.fetch_rows(&query)).await?;
        map_rows(rows, Utc::now())
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = CatalogResult<T>>,
    ) -> CatalogResult<T> {
        tokio::time::timeout(self.query.timeout, fut)
            .await
            .map_err(|_| CatalogError::Timeout)?
    }
}

/// Public id to document name.
fn decode_id(id: &str) -> CatalogResult<String> {
    let name = urlencoding::decode(id)
        .map_err(|_| CatalogError::validation("server id is not valid UTF-8"))?;
    if name.trim().is_empty() {
        return Err(CatalogError::validation("server id is required"));
    }
    Ok(name.into_owned())
}
