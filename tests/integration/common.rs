//! Mock Dataverse endpoints shared by the integration tests

use dvmeta::config::{Config, CrawlerConfig, OutputConfig, SourceConfig};
use dvmeta::crawler::{crawl, CrawlOptions, HttpMetadataSource, VersionPolicy};
use dvmeta::CrawlResult;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
pub fn create_test_config(base_url: &str, api_key: Option<&str>) -> Config {
    Config {
        source: SourceConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            user_agent: "dvmeta-test/1.0".to_string(),
        },
        crawler: CrawlerConfig {
            max_concurrent_requests: 4,
            request_timeout_secs: 5,
            max_retries: 2,
            retry_delay_ms: 10, // Very short for testing
        },
        output: OutputConfig::default(),
    }
}

pub fn pid(identifier: &str) -> String {
    format!("doi:10.5072/FK2/{}", identifier)
}

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "data": data}))
}

pub fn collection_item(id: u64, title: &str) -> Value {
    json!({"type": "dataverse", "id": id, "title": title})
}

pub fn dataset_item(id: u64, identifier: &str) -> Value {
    json!({
        "type": "dataset",
        "id": id,
        "protocol": "doi",
        "authority": "10.5072",
        "identifier": format!("FK2/{}", identifier),
        "persistentUrl": format!("https://doi.org/10.5072/FK2/{}", identifier),
    })
}

pub fn released_version(major: u64, minor: u64, file_size: u64) -> Value {
    json!({
        "id": major * 100 + minor,
        "versionNumber": major,
        "versionMinorNumber": minor,
        "versionState": "RELEASED",
        "files": [{
            "label": "data.csv",
            "dataFile": {
                "id": 9000 + major,
                "filename": "data.csv",
                "filesize": file_size,
                "checksum": {"type": "MD5", "value": "0cc175b9c0f1b6a831c399e269772661"}
            }
        }]
    })
}

pub fn draft_version() -> Value {
    json!({"id": 1, "versionState": "DRAFT", "files": []})
}

pub async fn mount_contents(server: &MockServer, collection: &str, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/api/dataverses/{}/contents", collection)))
        .respond_with(ok(Value::Array(items)))
        .mount(server)
        .await;
}

pub async fn mount_versions(server: &MockServer, identifier: &str, versions: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/datasets/:persistentId/versions"))
        .and(query_param("persistentId", pid(identifier).as_str()))
        .and(query_param("includeDeaccessioned", "true"))
        .respond_with(ok(Value::Array(versions)))
        .mount(server)
        .await;
}

pub async fn mount_assignments(server: &MockServer, dataset_id: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/datasets/{}/assignments", dataset_id)))
        .respond_with(ok(json!([
            {"id": 1, "assignee": "@dataverseAdmin", "_roleAlias": "admin"}
        ])))
        .mount(server)
        .await;
}

/// Crawls the mock server from `root`
pub async fn crawl_mock(server: &MockServer, root: &str, options: impl FnOnce(CrawlOptions) -> CrawlOptions) -> CrawlResult {
    let config = create_test_config(&server.uri(), Some("secret-token"));
    let source = HttpMetadataSource::from_config(&config).expect("Failed to build source");
    let options = options(CrawlOptions::new(root, VersionPolicy::Latest).with_concurrency(4));
    crawl(Arc::new(source), options).await
}
