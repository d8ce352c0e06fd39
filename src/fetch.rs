//! Bundle retrieval
//!
//! [`ArchiveFetcher`] performs exactly one GET per [`ArchiveReference`] and buffers the
//! whole body in memory. There is no internal retry; callers that want one wrap the
//! call themselves.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::types::ArchiveReference;
use std::time::Duration;
use url::Url;

/// Downloads bundles referenced by the service
///
/// Uses its own HTTP client without the service API token: bundle URLs are
/// pre-signed storage links.
#[derive(Clone, Debug)]
pub struct ArchiveFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl ArchiveFetcher {
    /// Create a fetcher with the configured download timeout
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::TransportMessage(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            timeout: config.timeout,
        })
    }

    /// Create a fetcher around an existing client
    ///
    /// `timeout` is only used in error messages; the client's own timeout applies.
    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Retrieve the complete bundle
    ///
    /// Fails with [`Error::FetchFailed`] on an empty or non-HTTP URL, a transport
    /// failure, a non-2xx response, or a body that could not be read completely.
    /// Never returns partial bytes.
    pub async fn fetch(&self, reference: ArchiveReference) -> Result<Vec<u8>> {
        let ArchiveReference { url, .. } = reference;

        let parsed = validate_url(&url)?;

        tracing::debug!(url = %url, "fetching bundle");

        let response = self.http.get(parsed).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {} seconds", self.timeout.as_secs())
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            tracing::warn!(url = %url, %reason, "bundle fetch failed");
            Error::FetchFailed {
                url: url.clone(),
                status: None,
                reason,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "bundle fetch rejected");
            return Err(Error::FetchFailed {
                url,
                status: Some(status.as_u16()),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::FetchFailed {
            url: url.clone(),
            status: Some(status.as_u16()),
            reason: format!("failed to read response body: {}", e),
        })?;

        tracing::info!(url = %url, bytes = body.len(), "bundle fetched");
        Ok(body.to_vec())
    }
}

fn validate_url(url: &str) -> Result<Url> {
    if url.trim().is_empty() {
        return Err(Error::FetchFailed {
            url: url.to_string(),
            status: None,
            reason: "bundle URL is empty".to_string(),
        });
    }

    let parsed = Url::parse(url).map_err(|e| Error::FetchFailed {
        url: url.to_string(),
        status: None,
        reason: format!("invalid URL: {}", e),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::FetchFailed {
            url: url.to_string(),
            status: None,
            reason: format!("unsupported URL scheme '{}'", other),
        }),
    }
}
