//! Enrichment configuration, loaded from environment variables or built in code.

use std::time::Duration;

use crate::error::CatalogError;

pub const DEFAULT_CATALOG_URL: &str = "https://flathub.org";

/// Runtime configuration for the enrichment subsystem.
///
/// Every field has a default so a catalog can be built without any
/// environment variables set.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Origin of the remote catalog (default: `"https://flathub.org"`).
    /// Root-relative icon URLs are resolved against it.
    pub catalog_base_url: String,

    /// Cache time-to-live in seconds. `0` disables caching entirely, a
    /// negative value keeps entries forever (default: `3600`).
    pub cache_ttl_secs: i64,

    /// Queue length at which a worker stops receiving new records (default: `3`).
    pub max_load_per_worker: usize,

    /// Upper bound on the number of live enrichment workers (default: `16`).
    pub max_workers: usize,

    /// GET attempts per record before it is abandoned (default: `3`).
    pub fetch_attempts: u32,

    /// Per-request timeout (default: 30 s).
    pub fetch_timeout: Duration,

    /// Pause between two attempts for the same record (default: none).
    pub retry_delay: Duration,

    /// `User-Agent` sent with every catalog request.
    pub user_agent: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            catalog_base_url: DEFAULT_CATALOG_URL.to_owned(),
            cache_ttl_secs: 60 * 60,
            max_load_per_worker: 3,
            max_workers: 16,
            fetch_attempts: 3,
            fetch_timeout: Duration::from_secs(30),
            retry_delay: Duration::ZERO,
            user_agent: concat!("pakmeta/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl EnrichConfig {
    /// Build [`EnrichConfig`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            catalog_base_url: env_or("PAKMETA_CATALOG_URL", &defaults.catalog_base_url),
            cache_ttl_secs: parse_env("PAKMETA_CACHE_TTL", defaults.cache_ttl_secs),
            max_load_per_worker: parse_env("PAKMETA_WORKER_LOAD", defaults.max_load_per_worker),
            max_workers: parse_env("PAKMETA_MAX_WORKERS", defaults.max_workers),
            fetch_attempts: parse_env("PAKMETA_FETCH_ATTEMPTS", defaults.fetch_attempts),
            fetch_timeout: Duration::from_secs(parse_env(
                "PAKMETA_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
            retry_delay: Duration::from_millis(parse_env("PAKMETA_RETRY_DELAY_MS", 0)),
            user_agent: defaults.user_agent,
        }
    }

    pub fn with_catalog_base_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_base_url = url.into();
        self
    }

    pub fn with_cache_ttl_secs(mut self, ttl: i64) -> Self {
        self.cache_ttl_secs = ttl;
        self
    }

    pub fn with_max_load_per_worker(mut self, load: usize) -> Self {
        self.max_load_per_worker = load;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Reject settings the pool or the fetch protocol cannot run with.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.catalog_base_url.trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "catalog base URL must not be empty".to_owned(),
            ));
        }
        if self.fetch_attempts == 0 {
            return Err(CatalogError::InvalidConfig(
                "fetch attempts must be at least 1".to_owned(),
            ));
        }
        if self.max_load_per_worker == 0 {
            return Err(CatalogError::InvalidConfig(
                "max load per worker must be at least 1".to_owned(),
            ));
        }
        if self.max_workers == 0 {
            return Err(CatalogError::InvalidConfig(
                "max workers must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
