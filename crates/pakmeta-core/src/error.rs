use thiserror::Error;

/// Failure of a single GET issued through a [`CatalogTransport`].
///
/// [`CatalogTransport`]: crate::transport::CatalogTransport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The connection could not be established or was reset.
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// Any other transport-level failure (TLS, body decoding, redirects, ...).
    #[error("request to {url} failed: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    /// Classify a `reqwest` error for the given URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_owned();
        if err.is_timeout() {
            TransportError::Timeout { url }
        } else if err.is_connect() {
            TransportError::Connect {
                url,
                message: err.to_string(),
            }
        } else {
            TransportError::Other {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Outcome of one failed attempt of the fetch protocol.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The catalog answered with something other than `200 OK`.
    #[error("catalog responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The catalog answered `200 OK` with nothing in the body.
    #[error("catalog responded with an empty body")]
    EmptyBody,

    /// The body was not the JSON document we expected.
    #[error("malformed catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by the enrichment worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn enrichment worker thread")]
    SpawnWorker {
        #[source]
        source: std::io::Error,
    },

    /// Every worker is at its load threshold and the roster is full.
    #[error("enrichment pool saturated ({workers} workers, {max_load} queued each)")]
    Saturated { workers: usize, max_load: usize },

    /// The worker's queue was closed before the record could be handed over.
    #[error("enrichment worker {worker_id} has stopped")]
    WorkerStopped { worker_id: usize },
}

/// Opaque failure reported by a [`PackageBackend`] implementation.
///
/// [`PackageBackend`]: crate::backend::PackageBackend
#[derive(Debug, Error)]
#[error("package backend error: {message}")]
pub struct BackendError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors returned by [`Catalog`] operations.
///
/// [`Catalog`]: crate::catalog::Catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("catalog request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The record's current commit does not appear in its commit history.
    #[error("commit {commit} of {package_id} not found in history")]
    CommitNotFound { package_id: String, commit: String },

    /// A backend field required by the operation is absent on the record.
    #[error("package {package_id} has no {field}")]
    MissingField {
        package_id: String,
        field: &'static str,
    },
}
