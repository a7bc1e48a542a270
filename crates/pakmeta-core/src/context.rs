//! Shared state of the enrichment subsystem.
//!
//! Built once at startup and passed (as `Arc<CatalogContext>`) to everything
//! that needs the caches or the pool.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::{Clock, ExpiringCache};
use crate::config::EnrichConfig;
use crate::error::{CatalogError, FetchError};
use crate::fetch::{CatalogDataCache, Fetcher};
use crate::pool::WorkerPool;
use crate::record::PackageHandle;
use crate::transport::{CatalogEndpoints, CatalogTransport, HttpTransport};

/// Record cache used by the catalog: package id → shared record.
pub type RecordCache = ExpiringCache<String, PackageHandle>;

#[derive(Debug)]
pub struct CatalogContext {
    config: EnrichConfig,
    records: RecordCache,
    catalog_data: Arc<CatalogDataCache>,
    fetcher: Arc<Fetcher>,
    pool: WorkerPool,
}

impl CatalogContext {
    /// Build a context talking to the catalog over HTTP.
    pub fn new(config: EnrichConfig) -> Result<Self, CatalogError> {
        let transport = HttpTransport::new(&config.user_agent).map_err(FetchError::from)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a context around a caller-supplied transport.
    pub fn with_transport(
        config: EnrichConfig,
        transport: Arc<dyn CatalogTransport>,
    ) -> Result<Self, CatalogError> {
        Self::with_clock(config, transport, Arc::new(Utc::now))
    }

    /// Like [`Self::with_transport`], with both caches reading time from `clock`.
    pub fn with_clock(
        config: EnrichConfig,
        transport: Arc<dyn CatalogTransport>,
        clock: Clock,
    ) -> Result<Self, CatalogError> {
        config.validate()?;

        let records = RecordCache::with_clock(config.cache_ttl_secs, Arc::clone(&clock));
        let catalog_data = Arc::new(CatalogDataCache::with_clock(config.cache_ttl_secs, clock));
        let fetcher = Arc::new(
            Fetcher::new(
                transport,
                CatalogEndpoints::new(config.catalog_base_url.clone()),
                Arc::clone(&catalog_data),
                config.fetch_attempts,
                config.fetch_timeout,
            )
            .with_retry_delay(config.retry_delay),
        );
        let pool = WorkerPool::new(
            Arc::clone(&fetcher),
            config.max_load_per_worker,
            config.max_workers,
        );

        info!(
            catalog = %config.catalog_base_url,
            cache_ttl_secs = config.cache_ttl_secs,
            max_load_per_worker = config.max_load_per_worker,
            max_workers = config.max_workers,
            "catalog context ready"
        );

        Ok(Self {
            config,
            records,
            catalog_data,
            fetcher,
            pool,
        })
    }

    /// Store every entry of the full catalog listing in the catalog-data
    /// cache. Returns how many entries were stored; `0` without a request when
    /// caching is disabled.
    pub fn refresh_catalog_data(&self) -> Result<usize, CatalogError> {
        if !self.catalog_data.is_enabled() {
            debug!("cache disabled; skipping catalog refresh");
            return Ok(0);
        }

        let entries = self.fetcher.fetch_catalog()?;
        let stored = entries.len();
        for entry in entries {
            let id = entry.flatpak_app_id.clone();
            self.catalog_data
                .put(id, entry.into_enrichment(self.fetcher.endpoints()));
        }

        info!(entries = stored, "catalog refreshed");
        Ok(stored)
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordCache {
        &self.records
    }

    pub fn catalog_data(&self) -> &CatalogDataCache {
        &self.catalog_data
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
