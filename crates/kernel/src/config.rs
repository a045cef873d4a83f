//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Apply embedded migrations at startup (default: true).
    pub run_migrations: bool,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Read-through cache settings.
    pub cache: CacheConfig,

    /// Listing query settings.
    pub query: QueryConfig,
}

/// TTL and sweep interval for the enriched collection cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long a populated collection stays valid (default: 300s).
    pub ttl: Duration,

    /// How often the background sweep evicts an expired entry (default: 600s).
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

/// Pagination and deadline settings for listing queries.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Page size used when the client sends none (default: 30).
    pub default_limit: u64,

    /// Larger limits are clamped to this (default: 100).
    pub max_limit: u64,

    /// Deadline for a single database read (default: 5s).
    pub timeout: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 30,
            max_limit: 100,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = parse_var("PORT", 3000u16)?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let cache = CacheConfig {
            ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", 300u64)?),
            cleanup_interval: Duration::from_secs(parse_var("CACHE_CLEANUP_SECS", 600u64)?),
        };

        let query = QueryConfig {
            default_limit: parse_var("QUERY_DEFAULT_LIMIT", 30u64)?,
            max_limit: parse_var("QUERY_MAX_LIMIT", 100u64)?,
            timeout: Duration::from_millis(parse_var("QUERY_TIMEOUT_MS", 5000u64)?),
        };

        let config = Self {
            port,
            database_url,
            database_max_connections,
            run_migrations,
            cors_allowed_origins,
            cache,
            query,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.query.max_limit < 1 {
            bail!("QUERY_MAX_LIMIT must be >= 1");
        }
        if !(1..=self.query.max_limit).contains(&self.query.default_limit) {
            bail!(
                "QUERY_DEFAULT_LIMIT must be between 1 and QUERY_MAX_LIMIT ({})",
                self.query.max_limit
            );
        }
        if self.query.timeout.is_zero() {
            bail!("QUERY_TIMEOUT_MS must be >= 1");
        }
        if self.cache.ttl.is_zero() {
            bail!("CACHE_TTL_SECS must be >= 1");
        }
        if self.cache.cleanup_interval.is_zero() {
            bail!("CACHE_CLEANUP_SECS must be >= 1");
        }
        Ok(())
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 3000,
            database_url: "postgres://localhost/curato".to_string(),
            database_max_connections: 10,
            run_migrations: true,
            cors_allowed_origins: vec!["*".to_string()],
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn default_limit_above_max_rejected() {
        let mut config = config();
        config.query.default_limit = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("QUERY_DEFAULT_LIMIT"));
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut config = config();
        config.cache.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_limit_rejected() {
        let mut config = config();
        config.query.max_limit = 0;
        config.query.default_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("QUERY_MAX_LIMIT"));
    }
}
