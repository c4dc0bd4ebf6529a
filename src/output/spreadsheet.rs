//! Tabular summary of the dataset metadata export
//!
//! One row per dataset that matched the version policy, flattened from the
//! stored version payload: citation fields, file statistics, subject and
//! metadata block usage, and role assignment counts. Written as
//! `<output>/csv_files/ds_metadata_<timestamp>.csv`.

use crate::output::json_output::sha256_hex;
use crate::output::traits::{ExportRecord, OutputError, OutputResult};
use crate::state::{CrawlResult, LeafRecord, VersionState};
use humansize::{format_size, DECIMAL};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const SPREADSHEET_NAME: &str = "ds_metadata";
const SPREADSHEET_DESCRIPTION: &str = "Dataset Metadata CSV";

/// Column name and the Dataverse subject it flags
const SUBJECTS: &[(&str, &str)] = &[
    ("CM_Subject_Agri", "Agricultural Sciences"),
    ("CM_Subject_AH", "Arts and Humanities"),
    ("CM_Subject_Astro", "Astronomy and Astrophysics"),
    ("CM_Subject_BM", "Business and Management"),
    ("CM_Subject_Chem", "Chemistry"),
    ("CM_Subject_Comp", "Computer and Information Science"),
    ("CM_Subject_EES", "Earth and Environmental Sciences"),
    ("CM_Subject_Eng", "Engineering"),
    ("CM_Subject_Law", "Law"),
    ("CM_Subject_Math", "Mathematical Sciences"),
    ("CM_Subject_Med", "Medicine, Health and Life Sciences"),
    ("CM_Subject_Phys", "Physics"),
    ("CM_Subject_SocSci", "Social Sciences"),
    ("CM_Subject_Other", "Other"),
];

/// Column name and the metadata block whose presence it flags
const METADATA_BLOCKS: &[(&str, &str)] = &[
    ("Meta_Geo", "geospatial"),
    ("Meta_SSHM", "socialscience"),
    ("Meta_Astro", "astrophysics"),
    ("Meta_LS", "biomedical"),
    ("Meta_Journal", "journal"),
    ("Meta_CWF", "computationalworkflow"),
];

/// Column name and the `_roleAlias` it counts
const ROLES: &[(&str, &str)] = &[
    ("DS_Admin", "admin"),
    ("DS_Contrib", "contributor"),
    ("DS_ContribPlus", "fullContributor"),
    ("DS_Curator", "curator"),
    ("DS_FileDown", "fileDownloader"),
    ("DS_Member", "member"),
];

/// One dataset's cells, in column order
pub type Row = Vec<(&'static str, String)>;

/// Header and rows of the spreadsheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spreadsheet {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Spreadsheet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds the spreadsheet from the datasets in the `ds_metadata` export
///
/// `base_url` is the installation root used for the `DatasetURL` column.
pub fn spreadsheet(result: &CrawlResult, base_url: &str) -> Spreadsheet {
    let mut sheet = Spreadsheet::default();

    for leaf in result.leaves_in_state(VersionState::Normal) {
        let row = dataset_row(result, leaf, base_url);
        if sheet.headers.is_empty() {
            sheet.headers = row.iter().map(|(header, _)| *header).collect();
        }
        sheet.rows.push(row.into_iter().map(|(_, cell)| cell).collect());
    }

    sheet
}

/// Flattens one dataset into spreadsheet cells
pub fn dataset_row(result: &CrawlResult, leaf: &LeafRecord, base_url: &str) -> Row {
    let payload = &leaf.payload;
    let authors = citation_values(payload, "author", Some("authorName"));
    let subjects = citation_values(payload, "subject", None);

    let mut row: Row = vec![
        ("DatasetTitle", join(&citation_values(payload, "title", None))),
        ("DS_Path", result.display_path(&leaf.id).unwrap_or_default()),
        ("DatasetPersistentId", leaf.persistent_id.clone()),
        ("DatasetId", leaf.id.clone()),
        (
            "DatasetURL",
            format!(
                "{}/dataset.xhtml?persistentId={}",
                base_url.trim_end_matches('/'),
                leaf.persistent_id
            ),
        ),
        ("VersionState", text(&payload["versionState"])),
        ("Version", leaf.version.clone().unwrap_or_default()),
        ("CreateTime", text(&payload["createTime"])),
        ("ReleaseTime", text(&payload["releaseTime"])),
        ("LastUpdateTime", text(&payload["lastUpdateTime"])),
        ("License", license(payload)),
        ("TermsOfUse", text(&payload["termsOfUse"])),
        ("RequestAccess", text(&payload["fileAccessRequest"])),
        ("CM_Author", join(&authors)),
        ("CM_NumberAuthors", authors.len().to_string()),
        ("CM_Subject", join(&subjects)),
        (
            "CM_Keyword",
            join(&citation_values(payload, "keyword", Some("keywordValue"))),
        ),
        (
            "CM_Descr",
            join(&citation_values(payload, "dsDescription", Some("dsDescriptionValue"))),
        ),
    ];

    for (column, subject) in SUBJECTS {
        row.push((*column, subjects.iter().any(|s| s == subject).to_string()));
    }
    for (column, block) in METADATA_BLOCKS {
        let used = payload["metadataBlocks"].get(block).is_some();
        row.push((*column, used.to_string()));
    }

    let files = payload["files"].as_array().map(Vec::as_slice).unwrap_or_default();
    let count_files = |matches: fn(&Value) -> bool| files.iter().filter(|f| matches(f)).count();
    row.extend([
        ("FileCount", leaf.files.len().to_string()),
        ("FileSize", leaf.total_bytes().to_string()),
        ("FileSize_normalized", format_size(leaf.total_bytes(), DECIMAL)),
        (
            "RestrictedFiles",
            count_files(|f| f["restricted"].as_bool() == Some(true)).to_string(),
        ),
        (
            "DF_Hierarchy",
            count_files(|f| !f["directoryLabel"].is_null()).to_string(),
        ),
        (
            "DF_Tags",
            count_files(|f| !f["dataFile"]["categories"].is_null()).to_string(),
        ),
        (
            "DF_Description",
            count_files(|f| !f["dataFile"]["description"].is_null()).to_string(),
        ),
    ]);

    match result.permissions.get(&leaf.id).and_then(Value::as_array) {
        Some(assignments) => {
            row.push(("DS_Permission", "true".to_string()));
            row.push(("DS_Collab", assignments.len().to_string()));
            for (column, role) in ROLES {
                let holders = assignments
                    .iter()
                    .filter(|a| a["_roleAlias"].as_str() == Some(*role))
                    .count();
                row.push((*column, holders.to_string()));
            }
        }
        None => {
            row.push(("DS_Permission", "false".to_string()));
            row.push(("DS_Collab", "NA".to_string()));
            for (column, _) in ROLES {
                row.push((*column, "NA".to_string()));
            }
        }
    }

    row
}

/// Values of a citation field, or of one subfield of a compound field
///
/// Primitive fields hold a string or a list of strings. Compound fields hold
/// one object or a list of objects keyed by subfield name.
pub fn citation_values(payload: &Value, type_name: &str, subfield: Option<&str>) -> Vec<String> {
    let Some(fields) = payload["metadataBlocks"]["citation"]["fields"].as_array() else {
        return Vec::new();
    };
    let Some(field) = fields.iter().find(|f| f["typeName"] == type_name) else {
        return Vec::new();
    };

    let entries: Vec<&Value> = match &field["value"] {
        Value::Array(values) => values.iter().collect(),
        Value::Null => Vec::new(),
        value => vec![value],
    };

    entries
        .into_iter()
        .filter_map(|entry| match subfield {
            Some(name) => entry[name]["value"].as_str(),
            None => entry.as_str(),
        })
        .map(|value| value.trim().to_string())
        .collect()
}

fn license(payload: &Value) -> String {
    match &payload["license"] {
        Value::Object(license) => license.get("name").map(text).unwrap_or_default(),
        other => text(other),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join(values: &[String]) -> String {
    values.join(", ")
}

/// Writes the spreadsheet as CSV next to the JSON exports
pub struct CsvOutputHandler {
    directory: PathBuf,
    timestamp: String,
}

impl CsvOutputHandler {
    /// Creates `<output_dir>/csv_files` if it doesn't exist
    pub fn new(output_dir: &Path, timestamp: &str) -> OutputResult<Self> {
        let directory = output_dir.join("csv_files");
        fs::create_dir_all(&directory)?;

        Ok(Self {
            directory,
            timestamp: timestamp.to_string(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `sheet` and records its checksum
    ///
    /// Returns None if there were no datasets to tabulate.
    pub fn write_spreadsheet(&self, sheet: &Spreadsheet) -> OutputResult<Option<ExportRecord>> {
        if sheet.is_empty() {
            tracing::info!("Skipping spreadsheet: no dataset metadata to tabulate");
            return Ok(None);
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&sheet.headers)?;
        for row in &sheet.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| OutputError::Write(e.to_string()))?;

        let path = self
            .directory
            .join(format!("{}_{}.csv", SPREADSHEET_NAME, self.timestamp));
        fs::write(&path, &bytes)
            .map_err(|e| OutputError::Write(format!("{}: {}", path.display(), e)))?;

        let checksum = sha256_hex(&bytes);
        tracing::info!(
            "Exported {} rows to {} (sha256 {})",
            sheet.rows.len(),
            path.display(),
            checksum
        );

        Ok(Some(ExportRecord {
            name: SPREADSHEET_NAME.to_string(),
            description: SPREADSHEET_DESCRIPTION.to_string(),
            path,
            checksum,
            entries: sheet.rows.len(),
        }))
    }
}
