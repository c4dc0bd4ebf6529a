//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the tree walk that coordinates all aspects of the
//! crawling process, including:
//! - Seeding the worklist with the root collection
//! - Claiming and scheduling newly discovered collections and datasets
//! - Classifying fetched datasets against the version policy
//! - Recording failures without aborting the crawl
//! - Freezing the hierarchy into a `CrawlResult` once the pool drains

use crate::crawler::classify::{classify, VersionPolicy};
use crate::crawler::fetcher::{FetchError, MetadataSource};
use crate::crawler::scheduler::Scheduler;
use crate::state::{
    CrawlResult, FailureKind, FetchOperation, Hierarchy, LeafRecord, LeafRef,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What to crawl and how
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Identifier or alias of the collection to start from
    pub root: String,

    pub policy: VersionPolicy,

    /// Also fetch role assignments for every dataset
    pub include_permissions: bool,

    /// Number of workers, and so the bound on simultaneous requests
    pub max_concurrent_requests: usize,
}

impl CrawlOptions {
    pub fn new(root: impl Into<String>, policy: VersionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            include_permissions: false,
            max_concurrent_requests: 10,
        }
    }

    pub fn with_permissions(mut self, include: bool) -> Self {
        self.include_permissions = include;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit;
        self
    }
}

/// One unit of work in the worklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlTask {
    ListChildren(String),
    FetchLeaf(LeafRef),
    FetchPermission(String),
}

impl CrawlTask {
    pub fn operation(&self) -> FetchOperation {
        match self {
            Self::ListChildren(_) => FetchOperation::ListChildren,
            Self::FetchLeaf(_) => FetchOperation::FetchLeaf,
            Self::FetchPermission(_) => FetchOperation::FetchPermission,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::ListChildren(id) | Self::FetchPermission(id) => id,
            Self::FetchLeaf(leaf) => &leaf.id,
        }
    }
}

/// Live counters, readable while the crawl runs
#[derive(Debug, Default)]
pub struct CrawlProgress {
    collections_visited: AtomicUsize,
    leaves_fetched: AtomicUsize,
    permissions_fetched: AtomicUsize,
    failures: AtomicUsize,
}

/// A point-in-time copy of `CrawlProgress`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub collections_visited: usize,
    pub leaves_fetched: usize,
    pub permissions_fetched: usize,
    pub failures: usize,
}

impl CrawlProgress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            collections_visited: self.collections_visited.load(Ordering::Relaxed),
            leaves_fetched: self.leaves_fetched.load(Ordering::Relaxed),
            permissions_fetched: self.permissions_fetched.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    source: Arc<dyn MetadataSource>,
    options: CrawlOptions,
    progress: Arc<CrawlProgress>,
    cancel: CancellationToken,
}

/// Everything a task handler needs, shared by all workers
struct TaskContext {
    source: Arc<dyn MetadataSource>,
    hierarchy: Hierarchy,
    progress: Arc<CrawlProgress>,
    scheduler: Scheduler<CrawlTask>,
    policy: VersionPolicy,
    include_permissions: bool,
}

impl Coordinator {
    pub fn new(source: Arc<dyn MetadataSource>, options: CrawlOptions) -> Self {
        Self {
            source,
            options,
            progress: Arc::new(CrawlProgress::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle to the live counters
    pub fn progress(&self) -> Arc<CrawlProgress> {
        Arc::clone(&self.progress)
    }

    /// Cancelling this token stops the crawl: queued work is dropped, requests
    /// already in flight finish, and `run` returns a partial result.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walks the hierarchy below the root until no work remains
    pub async fn run(self) -> CrawlResult {
        let start_time = Instant::now();
        tracing::info!(
            "Starting crawl of collection {} (version policy: {}, {} workers)",
            self.options.root,
            self.options.policy,
            self.options.max_concurrent_requests
        );

        let scheduler = Scheduler::new(self.options.max_concurrent_requests, self.cancel.clone());
        let context = Arc::new(TaskContext {
            source: self.source,
            hierarchy: Hierarchy::new(self.options.root.clone()),
            progress: self.progress,
            scheduler: scheduler.clone(),
            policy: self.options.policy,
            include_permissions: self.options.include_permissions,
        });

        scheduler.submit(CrawlTask::ListChildren(self.options.root.clone()));

        let handler_context = Arc::clone(&context);
        scheduler
            .await_drain(move |task| {
                let context = Arc::clone(&handler_context);
                async move { context.process(task).await }
            })
            .await;

        let cancelled = self.cancel.is_cancelled();
        let result = context.hierarchy.freeze(cancelled);

        if cancelled {
            tracing::warn!(
                "Crawl cancelled after {:?}: {} collections, {} datasets kept",
                start_time.elapsed(),
                result.collections.len(),
                result.leaves.len()
            );
        } else if result.root_failed() {
            tracing::error!(
                "Could not list root collection {}; nothing was crawled",
                result.root
            );
        } else {
            tracing::info!(
                "Crawl completed in {:?}: {} collections, {} datasets, {} failures",
                start_time.elapsed(),
                result.collections.len(),
                result.leaves.len(),
                result.failures.len()
            );
        }

        result
    }
}

impl TaskContext {
    async fn process(&self, task: CrawlTask) {
        match task {
            CrawlTask::ListChildren(id) => self.list_children(id).await,
            CrawlTask::FetchLeaf(leaf) => self.fetch_leaf(leaf).await,
            CrawlTask::FetchPermission(id) => self.fetch_permission(id).await,
        }
    }

    async fn list_children(&self, id: String) {
        let listing = match self.source.list_children(&id).await {
            Ok(listing) => listing,
            Err(e) => return self.fail(&id, FetchOperation::ListChildren, e),
        };

        CrawlProgress::bump(&self.progress.collections_visited);
        let discovered = self.hierarchy.record_listing(&id, &listing);
        tracing::debug!(
            "Collection {}: {} new collections, {} new datasets",
            id,
            discovered.collections.len(),
            discovered.leaves.len()
        );

        for child in discovered.collections {
            self.scheduler.submit(CrawlTask::ListChildren(child));
        }

        for leaf in discovered.leaves {
            if self.include_permissions
                && self.hierarchy.claim(FetchOperation::FetchPermission, &leaf.id)
            {
                self.scheduler
                    .submit(CrawlTask::FetchPermission(leaf.id.clone()));
            }
            self.scheduler.submit(CrawlTask::FetchLeaf(leaf));
        }
    }

    async fn fetch_leaf(&self, leaf: LeafRef) {
        let mut versions = match self.source.fetch_leaf_versions(&leaf).await {
            Ok(versions) => versions,
            Err(e) => return self.fail(&leaf.id, FetchOperation::FetchLeaf, e),
        };

        let Some(selection) = classify(&versions, &self.policy) else {
            let error = FetchError::new(
                FailureKind::NotFound,
                format!(
                    "no version of {} matches policy {}",
                    leaf.persistent_id, self.policy
                ),
            );
            return self.fail(&leaf.id, FetchOperation::FetchLeaf, error);
        };

        let version = versions.swap_remove(selection.index);
        let record = LeafRecord {
            version: version.label(),
            id: leaf.id,
            persistent_id: leaf.persistent_id,
            collection: leaf.collection,
            state: selection.state,
            payload: version.payload,
            files: version.files,
        };

        tracing::trace!("Dataset {} classified as {}", record.id, record.state);
        match self.hierarchy.insert_leaf(record) {
            Ok(()) => CrawlProgress::bump(&self.progress.leaves_fetched),
            Err(e) => tracing::error!("Could not record dataset: {}", e),
        }
    }

    async fn fetch_permission(&self, id: String) {
        match self.source.fetch_permissions(&id).await {
            Ok(payload) => {
                self.hierarchy.insert_permissions(&id, payload);
                CrawlProgress::bump(&self.progress.permissions_fetched);
            }
            Err(e) => self.fail(&id, FetchOperation::FetchPermission, e),
        }
    }

    fn fail(&self, id: &str, operation: FetchOperation, error: FetchError) {
        tracing::warn!("{} failed for {}: {}", operation, id, error);
        CrawlProgress::bump(&self.progress.failures);
        self.hierarchy.record_failure(error.into_failure(id, operation));
    }
}
