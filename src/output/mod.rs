//! Output module for exporting crawl results
//!
//! This module handles:
//! - Building JSON views of a crawl result
//! - Writing them to disk with SHA-256 checksums
//! - Tabulating dataset metadata as a CSV spreadsheet
//! - Generating the markdown crawl log
//! - Computing and printing crawl statistics

mod exports;
mod json_output;
mod markdown;
mod spreadsheet;
pub mod stats;
mod traits;

pub use exports::{
    collect_exports, dataset_metadata, empty_collections, failures, permission_dict, pid_dict,
    pid_dict_dd, ExportSelection,
};
pub use json_output::{file_timestamp, sha256_hex, JsonOutputHandler};
pub use markdown::{format_markdown_log, generate_markdown_log};
pub use spreadsheet::{citation_values, dataset_row, spreadsheet, CsvOutputHandler, Row, Spreadsheet};
pub use stats::{print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, Export, ExportRecord, OutputError, OutputHandler, OutputResult};

use crate::state::CrawlResult;

/// Writes every selected export of `result` through `handler`
///
/// Returns the records of the files actually written; empty exports that
/// are not marked `always` are skipped.
pub fn write_exports(
    handler: &mut dyn OutputHandler,
    result: &CrawlResult,
    selection: ExportSelection,
) -> OutputResult<Vec<ExportRecord>> {
    let mut written = Vec::new();
    for export in collect_exports(result, selection) {
        if let Some(record) = handler.write_export(&export)? {
            written.push(record);
        }
    }
    Ok(written)
}
