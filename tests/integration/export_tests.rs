//! Export and crawl log output for a crawled mock installation

use crate::common::*;
use chrono::Local;
use dvmeta::output::{
    generate_markdown_log, sha256_hex, spreadsheet, write_exports, CrawlStatistics, CrawlSummary,
    CsvOutputHandler, ExportSelection, JsonOutputHandler, OutputHandler,
};
use dvmeta::{CrawlResult, VersionState};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Root with a released dataset, a draft, an empty collection and a failing one
async fn crawl_sample_installation() -> CrawlResult {
    let mock_server = MockServer::start().await;

    mount_contents(
        &mock_server,
        "root",
        vec![
            collection_item(2, "Physics"),
            collection_item(3, "Vacant"),
            collection_item(4, "Down"),
        ],
    )
    .await;
    mount_contents(
        &mock_server,
        "2",
        vec![dataset_item(10, "AAA"), dataset_item(11, "BBB")],
    )
    .await;
    mount_contents(&mock_server, "3", vec![]).await;
    Mock::given(method("GET"))
        .and(path("/api/dataverses/4/contents"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 2048)]).await;
    mount_versions(&mock_server, "BBB", vec![draft_version()]).await;
    mount_assignments(&mock_server, 10).await;
    mount_assignments(&mock_server, 11).await;

    crawl_mock(&mock_server, "root", |options| options.with_permissions(true)).await
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_exports_written_with_checksums() {
    let result = crawl_sample_installation().await;
    let temp_dir = TempDir::new().unwrap();

    let mut handler = JsonOutputHandler::new(temp_dir.path(), "20250101-000000").unwrap();
    let selection = ExportSelection {
        empty_collections: true,
        permissions: true,
    };
    let records = write_exports(&mut handler, &result, selection).unwrap();

    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "pid_dict",
            "pid_dict_dd",
            "failed",
            "ds_metadata",
            "permission_dict",
            "empty_dv"
        ]
    );
    assert_eq!(handler.records().len(), records.len());

    for record in &records {
        let bytes = fs::read(&record.path).unwrap();
        assert_eq!(record.checksum, sha256_hex(&bytes), "{}", record.name);
    }

    let pid_dict = read_json(&temp_dir.path().join("json_files/pid_dict_20250101-000000.json"));
    assert_eq!(pid_dict["10"]["path"], "/Physics");
    assert_eq!(pid_dict["10"]["datasetPersistentId"], pid("AAA"));
    assert_eq!(pid_dict["11"]["pathIds"][1], "2");

    let dd = read_json(&records[1].path);
    assert_eq!(dd.as_object().unwrap().len(), 1);
    assert!(dd.get("11").is_some());

    let failed = read_json(&records[2].path);
    assert_eq!(failed[0]["id"], "4");
    assert_eq!(failed[0]["kind"], "transient-network");

    let metadata = read_json(&records[3].path);
    assert_eq!(metadata["10"]["version"], "1.0");
    assert_eq!(metadata["10"]["permission_info"]["status"], "OK");
    assert!(metadata.get("11").is_none());

    let empty = read_json(&records[5].path);
    assert_eq!(empty[0]["collectionId"], "3");
    assert_eq!(empty[0]["parentId"], "root");
}

#[tokio::test]
async fn test_optional_exports_skipped_by_default() {
    let result = crawl_sample_installation().await;
    let temp_dir = TempDir::new().unwrap();

    let mut handler = JsonOutputHandler::new(temp_dir.path(), "ts").unwrap();
    let records = write_exports(&mut handler, &result, ExportSelection::default()).unwrap();

    assert!(records.iter().all(|r| r.name != "permission_dict"));
    assert!(records.iter().all(|r| r.name != "empty_dv"));
    assert!(!handler.directory().join("empty_dv_ts.json").exists());
}

#[tokio::test]
async fn test_crawl_log_lists_exports() {
    let result = crawl_sample_installation().await;
    let temp_dir = TempDir::new().unwrap();

    let mut handler = JsonOutputHandler::new(temp_dir.path(), "ts").unwrap();
    let exports = write_exports(&mut handler, &result, ExportSelection::default()).unwrap();

    let statistics = CrawlStatistics::from_result(&result);
    assert_eq!(statistics.total_leaves, 2);
    assert_eq!(statistics.leaves_in_state(VersionState::Draft), 1);
    assert_eq!(statistics.empty_collections, 1);
    assert_eq!(statistics.total_failures(), 1);

    let started_at = Local::now();
    let summary = CrawlSummary {
        started_at,
        finished_at: started_at,
        config_hash: "cafe".to_string(),
        base_url: "http://mock".to_string(),
        root: result.root.clone(),
        policy: "latest".to_string(),
        statistics,
        exports: exports.clone(),
    };
    let log_path = generate_markdown_log(&summary, temp_dir.path(), "ts").unwrap();

    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("- **Root Collection**: root"));
    assert!(log.contains("| transient-network | 1 |"));
    for record in &exports {
        assert!(log.contains(&record.checksum));
    }
}

#[tokio::test]
async fn test_spreadsheet_tabulates_dataset_metadata() {
    let result = crawl_sample_installation().await;
    let temp_dir = TempDir::new().unwrap();

    let handler = CsvOutputHandler::new(temp_dir.path(), "ts").unwrap();
    let sheet = spreadsheet(&result, "http://mock/");
    let record = handler.write_spreadsheet(&sheet).unwrap().unwrap();

    assert_eq!(record.path, temp_dir.path().join("csv_files/ds_metadata_ts.csv"));
    let bytes = fs::read(&record.path).unwrap();
    assert_eq!(record.checksum, sha256_hex(&bytes));

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers().unwrap().clone();
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();

    // Only the released dataset is in ds_metadata; the draft is not
    assert_eq!(rows.len(), 1);
    let column = |name: &str| {
        let index = headers.iter().position(|h| h == name).unwrap();
        rows[0][index].to_string()
    };
    assert_eq!(column("DatasetId"), "10");
    assert_eq!(column("DS_Path"), "/Physics");
    assert_eq!(column("Version"), "1.0");
    assert_eq!(column("FileCount"), "1");
    assert_eq!(column("FileSize"), "2048");
    assert_eq!(
        column("DatasetURL"),
        format!("http://mock/dataset.xhtml?persistentId={}", pid("AAA"))
    );
    assert_eq!(column("DS_Permission"), "true");
    assert_eq!(column("DS_Admin"), "1");
}

#[tokio::test]
async fn test_crawl_log_lists_spreadsheet_checksum() {
    let result = crawl_sample_installation().await;
    let temp_dir = TempDir::new().unwrap();

    let mut handler = JsonOutputHandler::new(temp_dir.path(), "ts").unwrap();
    let mut exports = write_exports(&mut handler, &result, ExportSelection::default()).unwrap();
    let csv_handler = CsvOutputHandler::new(temp_dir.path(), "ts").unwrap();
    let record = csv_handler
        .write_spreadsheet(&spreadsheet(&result, "http://mock"))
        .unwrap()
        .unwrap();
    exports.push(record.clone());

    let started_at = Local::now();
    let summary = CrawlSummary {
        started_at,
        finished_at: started_at,
        config_hash: "cafe".to_string(),
        base_url: "http://mock".to_string(),
        root: result.root.clone(),
        policy: "latest".to_string(),
        statistics: CrawlStatistics::from_result(&result),
        exports,
    };
    let log_path = generate_markdown_log(&summary, temp_dir.path(), "ts").unwrap();

    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("Dataset Metadata CSV"));
    assert!(log.contains(&record.checksum));
}
