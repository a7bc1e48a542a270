//! Retried, single-record enrichment against the remote catalog.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::ExpiringCache;
use crate::error::FetchError;
use crate::record::{Enrichment, PackageRecord, PackageStatus};
use crate::transport::{CatalogEndpoints, CatalogTransport};

/// Catalog-data cache shared by the fetcher, the bulk refresh and the catalog.
pub type CatalogDataCache = ExpiringCache<String, Enrichment>;

/// Body of `GET /api/v1/apps/{id}`. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDetails {
    pub description: Option<String>,
    pub summary: Option<String>,
    pub icon_mobile_url: Option<String>,
    pub version: Option<String>,
    pub current_release_version: Option<String>,
}

/// One element of `GET /api/v1/apps`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub flatpak_app_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub icon_mobile_url: Option<String>,
    #[serde(default)]
    pub current_release_version: Option<String>,
}

impl AppDetails {
    /// Convert to mergeable fields, resolving the icon against `endpoints`.
    pub fn into_enrichment(self, endpoints: &CatalogEndpoints) -> Enrichment {
        Enrichment {
            version: self.version,
            latest_version: self.current_release_version,
            description: self.description.or(self.summary),
            icon_url: self.icon_mobile_url.map(|url| endpoints.absolutize(url)),
        }
    }
}

impl CatalogEntry {
    pub fn into_enrichment(self, endpoints: &CatalogEndpoints) -> Enrichment {
        Enrichment {
            version: None,
            latest_version: self.current_release_version,
            description: self.summary,
            icon_url: self.icon_mobile_url.map(|url| endpoints.absolutize(url)),
        }
    }
}

/// Result of running the protocol on one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// A response was merged and the record is `READY`.
    Ready { attempts: u32 },
    /// Every attempt failed; the record keeps its status.
    Abandoned { attempts: u32 },
}

/// Runs the fetch protocol. Shared by every worker of a pool.
pub struct Fetcher {
    transport: Arc<dyn CatalogTransport>,
    endpoints: CatalogEndpoints,
    data_cache: Arc<CatalogDataCache>,
    attempts: u32,
    timeout: Duration,
    retry_delay: Duration,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("endpoints", &self.endpoints)
            .field("attempts", &self.attempts)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        endpoints: CatalogEndpoints,
        data_cache: Arc<CatalogDataCache>,
        attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            endpoints,
            data_cache,
            attempts,
            timeout,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn endpoints(&self) -> &CatalogEndpoints {
        &self.endpoints
    }

    /// Enrich `record` in place.
    ///
    /// On success the fetched fields are merged into the record and stored
    /// as-is in the catalog-data cache, and the record becomes `READY`. When every attempt
    /// fails the record is left as it is (`LOADING` for a first fetch).
    pub fn enrich(&self, record: &PackageRecord) -> EnrichOutcome {
        record.advance_status(PackageStatus::Loading);

        for attempt in 1..=self.attempts {
            match self.fetch_once(record.id()) {
                Ok(details) => {
                    // Cache what the catalog sent, not the merge: a local version
                    // belongs to this installation only.
                    let fetched = details.into_enrichment(&self.endpoints);
                    self.data_cache.put(record.id().to_owned(), fetched.clone());
                    record.merge_enrichment(fetched);
                    record.advance_status(PackageStatus::Ready);
                    debug!(package_id = record.id(), attempt, "package data retrieved");
                    return EnrichOutcome::Ready { attempts: attempt };
                }
                Err(FetchError::Status { status, body }) => {
                    warn!(
                        package_id = record.id(),
                        attempt,
                        status,
                        body = %body,
                        "could not retrieve package data"
                    );
                }
                Err(e) => {
                    warn!(
                        package_id = record.id(),
                        attempt,
                        error = %e,
                        "could not retrieve package data"
                    );
                }
            }

            if attempt < self.attempts && !self.retry_delay.is_zero() {
                std::thread::sleep(self.retry_delay);
            }
        }

        warn!(
            package_id = record.id(),
            attempts = self.attempts,
            "giving up on package data"
        );
        EnrichOutcome::Abandoned {
            attempts: self.attempts,
        }
    }

    fn fetch_once(&self, id: &str) -> Result<AppDetails, FetchError> {
        self.get_json(&self.endpoints.app_url(id))
    }

    /// Download the full catalog listing (single attempt).
    pub fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, FetchError> {
        self.get_json(&self.endpoints.apps_url())
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let resp = self.transport.get(url, self.timeout)?;

        if resp.status != 200 {
            return Err(FetchError::Status {
                status: resp.status,
                body: resp.body,
            });
        }
        if resp.body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(serde_json::from_str(&resp.body)?)
    }
}
