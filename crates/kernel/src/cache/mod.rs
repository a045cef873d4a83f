//! Read-through cache for the enriched collection.
//!
//! Holds a single entry: every latest server, enriched, in the default
//! order. The entry lives in a one-key moka cache that enforces the TTL; a
//! `parking_lot` read/write lock around it lets readers share access while
//! `set` and `clear` run exclusively. A background sweep runs moka's pending
//! maintenance so an expired entry nobody reads is still freed.
//!
//! `set` is unconditional. A reader that loaded the collection before a
//! mutation committed can still store it after that mutation's `clear`;
//! the stale entry lives until the next clear or until it expires.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::enrich::EnrichedServer;

/// Shortest sweep period; `interval_at` rejects a zero period.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared handle to the enriched collection cache.
#[derive(Clone)]
pub struct EnrichedCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    ttl: Duration,
    cleanup_interval: Duration,
    collection: Cache<(), Arc<Vec<EnrichedServer>>>,

    /// When the collection was last stored; survives `clear`.
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl EnrichedCache {
    /// Create an empty cache.
    ///
    /// A cleanup interval under one second is raised to one second.
    pub fn new(config: CacheConfig) -> Self {
        let collection = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.ttl)
            .build();

        Self {
            inner: Arc::new(CacheInner {
                ttl: config.ttl,
                cleanup_interval: config.cleanup_interval.max(MIN_CLEANUP_INTERVAL),
                collection,
                last_update: RwLock::new(None),
            }),
        }
    }

    /// The cached collection, if present and not expired.
    pub fn get(&self) -> Option<Arc<Vec<EnrichedServer>>> {
        let _shared = self.inner.last_update.read();
        match self.inner.collection.get(&()) {
            Some(servers) => {
                debug!(servers = servers.len(), "enriched cache hit");
                Some(servers)
            }
            None => {
                debug!("enriched cache miss");
                None
            }
        }
    }

    /// Replace the cached collection and restart its TTL.
    pub fn set(&self, servers: Vec<EnrichedServer>) -> Arc<Vec<EnrichedServer>> {
        let servers = Arc::new(servers);
        let mut last_update = self.inner.last_update.write();
        self.inner.collection.insert((), Arc::clone(&servers));
        *last_update = Some(Utc::now());
        debug!(servers = servers.len(), ttl = ?self.inner.ttl, "enriched cache set");
        servers
    }

    /// Drop the cached collection.
    pub fn clear(&self) {
        let _exclusive = self.inner.last_update.write();
        self.inner.collection.invalidate(&());
        debug!("enriched cache cleared");
    }

    /// When the collection was last stored, if ever.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_update.read()
    }

    /// Run pending expirations and invalidations now.
    pub fn evict_expired(&self) {
        self.inner.collection.run_pending_tasks();
    }

    /// Start the background sweep.
    ///
    /// The task holds a weak reference and exits once every handle to this
    /// cache is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let period = self.inner.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("enriched cache dropped, sweeper exiting");
                    break;
                };
                inner.collection.run_pending_tasks();
            }
        })
    }

    /// Entries moka still counts, without running maintenance first.
    #[cfg(test)]
    fn stored_entries(&self) -> u64 {
        self.inner.collection.entry_count()
    }
}
