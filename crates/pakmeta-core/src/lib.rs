//! Asynchronous metadata enrichment for locally known packages.
//!
//! Records are handed out immediately by [`Catalog`] and filled in the
//! background by a pool of worker threads that query the remote catalog,
//! with an expiring cache in front to avoid refetching.

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod pool;
pub mod record;
pub mod transport;
pub mod worker;

pub use backend::{DowngradeStream, PackageBackend};
pub use cache::{CacheEntry, Clock, ExpiringCache};
pub use catalog::{Catalog, DowngradeOutcome};
pub use config::EnrichConfig;
pub use context::CatalogContext;
pub use error::{BackendError, CatalogError, FetchError, PoolError, TransportError};
pub use fetch::{EnrichOutcome, Fetcher};
pub use pool::WorkerPool;
pub use record::{Enrichment, PackageHandle, PackageRecord, PackageStatus, PackageView, RawPackage};
pub use transport::{CatalogEndpoints, CatalogTransport, HttpTransport, TransportResponse};
