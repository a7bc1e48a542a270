use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::warn;

use crate::error::TransportError;

/// Status and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Anything able to issue a GET with a timeout.
///
/// Implementations are called from enrichment worker threads and must not
/// depend on an async runtime being present.
pub trait CatalogTransport: Send + Sync + 'static {
    fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

/// URL layout of the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
    base: String,
}

impl CatalogEndpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `GET {base}/api/v1/apps/{id}`
    pub fn app_url(&self, id: &str) -> String {
        format!("{}/api/v1/apps/{}", self.base, id)
    }

    /// `GET {base}/api/v1/apps`
    pub fn apps_url(&self) -> String {
        format!("{}/api/v1/apps", self.base)
    }

    /// Prefix a root-relative URL (`/icons/x.png`) with the catalog origin.
    /// Absolute URLs are returned unchanged.
    pub fn absolutize(&self, url: String) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.base, url)
        } else {
            url
        }
    }
}

/// [`CatalogTransport`] backed by a blocking `reqwest` client.
///
/// Proxy is automatically read from `HTTP_PROXY` / `HTTPS_PROXY` environment variables.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(user_agent.to_owned());

        let proxy = env::var("HTTP_PROXY")
            .ok()
            .or_else(|| env::var("HTTPS_PROXY").ok());
        if let Some(ref proxy_url) = proxy {
            match reqwest::Proxy::all(proxy_url) {
                Ok(p) => {
                    builder = builder.proxy(p);
                }
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL");
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

impl CatalogTransport for HttpTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        Ok(TransportResponse { status, body })
    }
}
