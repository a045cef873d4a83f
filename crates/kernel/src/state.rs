//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::EnrichedCache;
use crate::config::Config;
use crate::db;
use crate::services::CatalogService;
use crate::store::PgCatalogStore;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: CatalogService,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations, and start the cache sweep.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        info!(
            max_connections = config.database_max_connections,
            "connected to PostgreSQL"
        );

        if config.run_migrations {
            db::run_migrations(&pool).await?;
            info!("database migrations applied");
        }

        let store = Arc::new(PgCatalogStore::new(pool, config.query.timeout));
        let cache = EnrichedCache::new(config.cache);
        let _sweeper = cache.spawn_sweeper();
        info!(
            ttl_secs = config.cache.ttl.as_secs(),
            cleanup_secs = config.cache.cleanup_interval.as_secs(),
            "enriched cache ready"
        );

        Ok(Self::from_service(CatalogService::new(store, cache, config.query)))
    }

    /// State around an already-built catalog service.
    pub fn from_service(catalog: CatalogService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { catalog }),
        }
    }

    /// Catalog operations.
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }
}
