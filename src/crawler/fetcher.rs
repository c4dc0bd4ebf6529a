//! Metadata source abstraction and its HTTP implementation
//!
//! This module handles:
//! - The `MetadataSource` contract the crawler is written against
//! - Building the HTTP client with the API key and user agent headers
//! - Transport-level retries for transient failures
//! - Mapping HTTP statuses onto the failure taxonomy

use crate::config::{Config, CrawlerConfig};
use crate::crawler::api;
use crate::state::{
    ChildListing, FailureKind, FailureRecord, FetchOperation, FileDescriptor, LeafRef,
    ReleaseState,
};
use crate::DvMetaError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Header Dataverse reads the API token from (`X-Dataverse-key`)
pub const API_KEY_HEADER: &str = "x-dataverse-key";

/// A fetch that did not produce a usable result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn into_failure(self, id: impl Into<String>, operation: FetchOperation) -> FailureRecord {
        FailureRecord::new(id, operation, self.kind, self.message)
    }
}

/// One version of a dataset as reported by the source
#[derive(Debug, Clone, PartialEq)]
pub struct LeafVersion {
    /// `(major, minor)`; None for drafts
    pub number: Option<(u64, u64)>,

    /// None if the source reported a state we don't know
    pub release: Option<ReleaseState>,

    pub files: Vec<FileDescriptor>,

    /// The version object exactly as returned
    pub payload: Value,
}

impl LeafVersion {
    /// `major.minor`, or None for drafts
    pub fn label(&self) -> Option<String> {
        self.number
            .map(|(major, minor)| format!("{}.{}", major, minor))
    }
}

/// Where the crawler reads collections and datasets from
///
/// Each call issues exactly one logical request. Implementations must be
/// safe to call from many tasks at once.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Lists the direct child collections and datasets of a collection
    async fn list_children(&self, collection_id: &str) -> Result<ChildListing, FetchError>;

    /// Fetches every version of a dataset, drafts and deaccessioned included
    async fn fetch_leaf_versions(&self, leaf: &LeafRef) -> Result<Vec<LeafVersion>, FetchError>;

    /// Fetches the role assignments of a dataset
    async fn fetch_permissions(&self, leaf_id: &str) -> Result<Value, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Every request carries `Accept: application/json`, the configured user
/// agent and, when one is configured, the API key. The key header is
/// marked sensitive so it never shows up in debug output.
pub fn build_http_client(config: &Config) -> Result<Client, DvMetaError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(key) = config.source.effective_api_key() {
        let mut value = HeaderValue::from_str(key).map_err(|_| DvMetaError::InvalidApiKey)?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }

    let timeout = Duration::from_secs(config.crawler.request_timeout_secs);

    let client = Client::builder()
        .user_agent(config.source.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Maps a non-success HTTP status onto the failure taxonomy
///
/// | Status | Kind |
/// |--------|------|
/// | 404, 410 | not-found |
/// | 401, 403 | forbidden |
/// | 408, 429, 5xx | transient-network |
/// | anything else | malformed-response |
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FailureKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Forbidden,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FailureKind::TransientNetwork
        }
        s if s.is_server_error() => FailureKind::TransientNetwork,
        _ => FailureKind::MalformedResponse,
    }
}

fn transport_error(error: reqwest::Error) -> FetchError {
    let kind = if error.is_builder() || error.is_redirect() || error.is_decode() {
        FailureKind::MalformedResponse
    } else {
        FailureKind::TransientNetwork
    };

    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    FetchError::new(kind, message)
}

/// `MetadataSource` backed by the Dataverse native API
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    client: Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpMetadataSource {
    pub fn new(client: Client, base_url: Url, crawler: &CrawlerConfig) -> Self {
        Self {
            client,
            base_url,
            max_retries: crawler.max_retries,
            retry_delay: Duration::from_millis(crawler.retry_delay_ms),
        }
    }

    /// Builds the client and source from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self, DvMetaError> {
        let client = build_http_client(config)?;
        let base_url = Url::parse(&config.source.base_url)?;
        Ok(Self::new(client, base_url, &config.crawler))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GETs `url` and returns the envelope's `data`, retrying transient failures
    ///
    /// The delay doubles after every attempt.
    async fn get_data(&self, url: Url) -> Result<Value, FetchError> {
        let mut attempt = 0;

        loop {
            match self.get_once(&url).await {
                Ok(data) => return Ok(data),
                Err(e) if e.kind.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    tracing::debug!(
                        "Retrying {} in {:?} (attempt {}/{}): {}",
                        url.path(),
                        delay,
                        attempt,
                        self.max_retries,
                        e.message
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &Url) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                classify_status(status),
                format!("HTTP {} from {}", status.as_u16(), url.path()),
            ));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        api::unwrap_envelope(&body).map_err(|e| {
            tracing::warn!("Malformed response from {}: {}", url.path(), e.message);
            e
        })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn list_children(&self, collection_id: &str) -> Result<ChildListing, FetchError> {
        let url = self.endpoint(&["api", "dataverses", collection_id, "contents"]);
        let data = self.get_data(url).await?;
        api::parse_listing(data)
    }

    async fn fetch_leaf_versions(&self, leaf: &LeafRef) -> Result<Vec<LeafVersion>, FetchError> {
        let mut url = self.endpoint(&["api", "datasets", ":persistentId", "versions"]);
        url.query_pairs_mut()
            .append_pair("persistentId", &leaf.persistent_id)
            .append_pair("includeDeaccessioned", "true");

        let data = self.get_data(url).await?;
        api::parse_versions(data)
    }

    async fn fetch_permissions(&self, leaf_id: &str) -> Result<Value, FetchError> {
        let url = self.endpoint(&["api", "datasets", leaf_id, "assignments"]);
        self.get_data(url).await
    }
}
