//! Markdown crawl log generation
//!
//! This module renders a human-readable log of one crawl run: timing,
//! configuration, dataset counts, failures, and the exported files with
//! their checksums.

use crate::output::traits::{CrawlSummary, OutputResult};
use crate::state::{FailureKind, FetchOperation, VersionState};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the crawl log to `<output_dir>/log_files/log_<timestamp>.md`
///
/// Returns the path of the written file.
pub fn generate_markdown_log(
    summary: &CrawlSummary,
    output_dir: &Path,
    timestamp: &str,
) -> OutputResult<PathBuf> {
    let directory = output_dir.join("log_files");
    fs::create_dir_all(&directory)?;

    let path = directory.join(format!("log_{}.md", timestamp));
    fs::write(&path, format_markdown_log(summary))?;

    Ok(path)
}

/// Formats a crawl summary as markdown
pub fn format_markdown_log(summary: &CrawlSummary) -> String {
    let stats = &summary.statistics;
    let mut md = String::new();

    md.push_str("# Dataverse Metadata Crawl Log\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Started**: {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str(&format!(
        "- **Finished**: {}\n",
        summary.finished_at.format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str(&format!(
        "- **Duration**: {} seconds ({:.2} minutes)\n",
        summary.duration_seconds(),
        summary.duration_seconds() as f64 / 60.0
    ));
    md.push_str(&format!(
        "- **Status**: {}\n",
        if stats.cancelled {
            "cancelled"
        } else {
            "completed"
        }
    ));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Crawl Parameters\n\n");
    md.push_str(&format!("- **Installation**: {}\n", summary.base_url));
    md.push_str(&format!("- **Root Collection**: {}\n", summary.root));
    md.push_str(&format!("- **Dataset Version**: {}\n\n", summary.policy));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Collections**: {}\n", stats.collections));
    md.push_str(&format!(
        "- **Empty Collections**: {}\n",
        stats.empty_collections
    ));
    md.push_str(&format!("- **Datasets**: {}\n", stats.total_leaves));
    md.push_str(&format!(
        "- **Files**: {} ({})\n",
        stats.file_count,
        stats.total_size()
    ));
    md.push_str(&format!("- **Failures**: {}\n", stats.total_failures()));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    // State breakdown
    md.push_str("## Dataset State Breakdown\n\n");
    md.push_str("| State | Count |\n");
    md.push_str("|-------|-------|\n");
    for state in VersionState::all_states() {
        md.push_str(&format!("| {} | {} |\n", state, stats.leaves_in_state(state)));
    }
    md.push('\n');

    // Failures
    if stats.total_failures() > 0 {
        md.push_str("## Failures\n\n");
        md.push_str("| Operation | Count |\n");
        md.push_str("|-----------|-------|\n");
        for operation in FetchOperation::all() {
            if let Some(count) = stats.failures_by_operation.get(&operation) {
                md.push_str(&format!("| {} | {} |\n", operation, count));
            }
        }
        md.push('\n');

        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for kind in FailureKind::all() {
            if let Some(count) = stats.failures_by_kind.get(&kind) {
                md.push_str(&format!("| {} | {} |\n", kind, count));
            }
        }
        md.push('\n');
    }

    // Exported files
    if !summary.exports.is_empty() {
        md.push_str("## Exported Files\n\n");
        md.push_str("| Content | Entries | Path | SHA-256 |\n");
        md.push_str("|---------|---------|------|---------|\n");
        for record in &summary.exports {
            md.push_str(&format!(
                "| {} | {} | {} | `{}` |\n",
                record.description,
                record.entries,
                record.path.display(),
                record.checksum
            ));
        }
        md.push('\n');
    }

    md
}
