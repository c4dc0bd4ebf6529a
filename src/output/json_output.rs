//! JSON export writer
//!
//! Files land in `<output>/json_files/<name>_<timestamp>.json`. Every file
//! is hashed with SHA-256 as it is written so the crawl log can list
//! checksums for later integrity checks.

use crate::output::traits::{Export, ExportRecord, OutputError, OutputHandler, OutputResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes exports as pretty-printed JSON files
pub struct JsonOutputHandler {
    directory: PathBuf,
    timestamp: String,
    records: Vec<ExportRecord>,
}

impl JsonOutputHandler {
    /// Creates `<output_dir>/json_files` if it doesn't exist
    ///
    /// `timestamp` is appended to every file name written by this handler.
    pub fn new(output_dir: &Path, timestamp: &str) -> OutputResult<Self> {
        let directory = output_dir.join("json_files");
        fs::create_dir_all(&directory)?;

        Ok(Self {
            directory,
            timestamp: timestamp.to_string(),
            records: Vec::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl OutputHandler for JsonOutputHandler {
    fn write_export(&mut self, export: &Export) -> OutputResult<Option<ExportRecord>> {
        if export.is_empty() && !export.always {
            tracing::info!("Skipping {}: nothing to export", export.name);
            return Ok(None);
        }

        let bytes = serde_json::to_vec_pretty(&export.value)?;
        let path = self
            .directory
            .join(format!("{}_{}.json", export.name, self.timestamp));
        fs::write(&path, &bytes)
            .map_err(|e| OutputError::Write(format!("{}: {}", path.display(), e)))?;

        let checksum = sha256_hex(&bytes);
        tracing::info!(
            "Exported {} entries to {} (sha256 {})",
            export.entries,
            path.display(),
            checksum
        );

        let record = ExportRecord {
            name: export.name.to_string(),
            description: export.description.to_string(),
            path,
            checksum,
            entries: export.entries,
        };
        self.records.push(record.clone());
        Ok(Some(record))
    }

    fn records(&self) -> &[ExportRecord] {
        &self.records
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Current local time formatted for file names, e.g. `20250131-154502`
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn export(name: &'static str, value: serde_json::Value, entries: usize, always: bool) -> Export {
        Export {
            name,
            description: "test export",
            value,
            entries,
            always,
        }
    }

    #[test]
    fn test_writes_file_with_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = JsonOutputHandler::new(temp_dir.path(), "20250101-000000").unwrap();

        let record = handler
            .write_export(&export("pid_dict", json!({"1": {"path": "/"}}), 1, false))
            .unwrap()
            .unwrap();

        assert_eq!(
            record.path,
            temp_dir.path().join("json_files/pid_dict_20250101-000000.json")
        );
        let written = fs::read(&record.path).unwrap();
        assert_eq!(record.checksum, sha256_hex(&written));
        assert_eq!(record.checksum.len(), 64);

        let parsed: serde_json::Value = serde_json::from_slice(&written).unwrap();
        assert_eq!(parsed["1"]["path"], "/");
        assert_eq!(handler.records().len(), 1);
    }

    #[test]
    fn test_skips_empty_exports() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = JsonOutputHandler::new(temp_dir.path(), "ts").unwrap();

        let skipped = handler
            .write_export(&export("empty_dv", json!([]), 0, false))
            .unwrap();
        assert!(skipped.is_none());
        assert!(!handler.directory().join("empty_dv_ts.json").exists());
        assert!(handler.records().is_empty());
    }

    #[test]
    fn test_writes_empty_export_when_always() {
        let temp_dir = TempDir::new().unwrap();
        let mut handler = JsonOutputHandler::new(temp_dir.path(), "ts").unwrap();

        let record = handler
            .write_export(&export("failed", json!([]), 0, true))
            .unwrap();
        assert!(record.is_some());
        assert!(handler.directory().join("failed_ts.json").exists());
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_timestamp_format() {
        let ts = file_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "-");
        assert!(ts.replace('-', "").chars().all(|c| c.is_ascii_digit()));
    }
}
