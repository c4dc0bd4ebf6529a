//! Crawler module for walking a Dataverse collection tree
//!
//! This module contains the core crawling logic, including:
//! - The metadata source contract and its HTTP implementation with retries
//! - A bounded worker pool that drains at quiescence
//! - Version policy classification
//! - Overall crawl coordination

mod api;
mod classify;
mod coordinator;
mod fetcher;
mod scheduler;

pub use classify::{classify, Selection, VersionPolicy};
pub use coordinator::{
    Coordinator, CrawlOptions, CrawlProgress, CrawlTask, ProgressSnapshot,
};
pub use fetcher::{
    build_http_client, classify_status, FetchError, HttpMetadataSource, LeafVersion,
    MetadataSource, API_KEY_HEADER,
};
pub use scheduler::Scheduler;

use crate::state::CrawlResult;
use std::sync::Arc;

/// Runs a complete crawl
///
/// Lists the root collection, then every collection and dataset reachable
/// from it, and returns once nothing is queued or in flight. Fetch failures
/// are collected in the result rather than returned as errors.
///
/// # Example
///
/// ```no_run
/// use dvmeta::config::load_config;
/// use dvmeta::crawler::{crawl, CrawlOptions, HttpMetadataSource, VersionPolicy};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let source = Arc::new(HttpMetadataSource::from_config(&config)?);
/// let options = CrawlOptions::new("harvard", "latest-published".parse::<VersionPolicy>()?);
///
/// let result = crawl(source, options).await;
/// println!("{} datasets, {} failures", result.leaves.len(), result.failures.len());
/// # Ok(())
/// # }
/// ```
pub async fn crawl(source: Arc<dyn MetadataSource>, options: CrawlOptions) -> CrawlResult {
    Coordinator::new(source, options).run().await
}
