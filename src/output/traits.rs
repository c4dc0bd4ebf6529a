//! Output handler traits and types
//!
//! This module defines the trait interface for export writers and the data
//! structures shared by the exports and the crawl log.

use crate::output::stats::CrawlStatistics;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One JSON document derived from a crawl result
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    /// File name stem, e.g. `ds_metadata`
    pub name: &'static str,

    /// Human-readable description used in the crawl log
    pub description: &'static str,

    pub value: Value,

    /// Number of top-level entries in `value`
    pub entries: usize,

    /// Write the file even when it has no entries
    pub always: bool,
}

impl Export {
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// A file that was written, with its SHA-256 checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub checksum: String,
    pub entries: usize,
}

/// Trait for export writers
///
/// Implementations receive every export of a run in turn and keep a record
/// of each file they produced.
pub trait OutputHandler {
    /// Writes one export
    ///
    /// Returns None if the export was skipped because it had no entries.
    fn write_export(&mut self, export: &Export) -> OutputResult<Option<ExportRecord>>;

    /// Files written so far, in order
    fn records(&self) -> &[ExportRecord];
}

/// Everything the crawl log reports about one run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub config_hash: String,
    pub base_url: String,
    pub root: String,
    pub policy: String,
    pub statistics: CrawlStatistics,
    pub exports: Vec<ExportRecord>,
}

impl CrawlSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }

    /// Datasets fetched as a percentage of datasets attempted
    pub fn success_rate(&self) -> f64 {
        let attempted = self.statistics.total_leaves + self.statistics.failed_leaves();
        if attempted == 0 {
            return 0.0;
        }
        (self.statistics.total_leaves as f64 / attempted as f64) * 100.0
    }
}
