//! Statistics derived from a crawl result
//!
//! This module provides functionality for summarizing a `CrawlResult` and
//! displaying the summary on stdout.

use crate::state::{CrawlResult, FailureKind, FetchOperation, VersionState};
use humansize::{format_size, DECIMAL};
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Collections reached, including ones whose listing failed
    pub collections: usize,

    /// Collections confirmed to have no datasets below them
    pub empty_collections: usize,

    /// Datasets fetched and classified
    pub total_leaves: usize,

    pub leaves_by_state: BTreeMap<VersionState, usize>,

    pub failures_by_operation: BTreeMap<FetchOperation, usize>,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,

    /// Failures a re-run might fix without any change
    pub retryable_failures: usize,

    pub permissions: usize,

    /// Files across all fetched datasets
    pub file_count: usize,

    /// Bytes across all fetched datasets
    pub total_bytes: u64,

    /// Longest ancestor path of any dataset
    pub max_depth: usize,

    pub cancelled: bool,
}

impl CrawlStatistics {
    pub fn from_result(result: &CrawlResult) -> Self {
        let mut leaves_by_state = BTreeMap::new();
        for leaf in result.leaves.values() {
            *leaves_by_state.entry(leaf.state).or_insert(0) += 1;
        }

        let mut failures_by_operation = BTreeMap::new();
        let mut failures_by_kind = BTreeMap::new();
        for failure in &result.failures {
            *failures_by_operation.entry(failure.operation).or_insert(0) += 1;
            *failures_by_kind.entry(failure.kind).or_insert(0) += 1;
        }

        Self {
            collections: result.collections.len(),
            empty_collections: result.empty_collections.len(),
            total_leaves: result.leaves.len(),
            leaves_by_state,
            failures_by_operation,
            failures_by_kind,
            retryable_failures: result
                .failures
                .iter()
                .filter(|f| f.kind.is_retryable())
                .count(),
            permissions: result.permissions.len(),
            file_count: result.file_count(),
            total_bytes: result.total_bytes(),
            max_depth: result.ancestry.values().map(Vec::len).max().unwrap_or(0),
            cancelled: result.cancelled,
        }
    }

    pub fn leaves_in_state(&self, state: VersionState) -> usize {
        self.leaves_by_state.get(&state).copied().unwrap_or(0)
    }

    pub fn total_failures(&self) -> usize {
        self.failures_by_operation.values().sum()
    }

    pub fn failed_leaves(&self) -> usize {
        self.failures_by_operation
            .get(&FetchOperation::FetchLeaf)
            .copied()
            .unwrap_or(0)
    }

    /// Total file size, e.g. `1.20 MB`
    pub fn total_size(&self) -> String {
        format_size(self.total_bytes, DECIMAL)
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if stats.cancelled {
        println!("(crawl was cancelled; results are partial)\n");
    }

    println!("Overview:");
    println!("  Collections: {}", stats.collections);
    println!("  Empty collections: {}", stats.empty_collections);
    println!("  Datasets: {}", stats.total_leaves);
    println!("  Deepest dataset: {} levels", stats.max_depth);
    println!("  Files: {} ({})", stats.file_count, stats.total_size());
    if stats.permissions > 0 {
        println!("  Permission records: {}", stats.permissions);
    }
    println!();

    println!("Datasets by State:");
    for state in VersionState::all_states() {
        let count = stats.leaves_in_state(state);
        let percentage = if stats.total_leaves > 0 {
            (count as f64 / stats.total_leaves as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if stats.total_failures() > 0 {
        println!("Failures by Operation:");
        for (operation, count) in &stats.failures_by_operation {
            println!("  {}: {}", operation, count);
        }
        println!();

        println!("Failures by Kind:");
        for (kind, count) in &stats.failures_by_kind {
            println!("  {}: {}", kind, count);
        }
        println!();

        if stats.retryable_failures > 0 {
            println!(
                "{} failures were transient; re-running may recover them",
                stats.retryable_failures
            );
            println!();
        }
    }
}
