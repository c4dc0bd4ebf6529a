//! End-to-end crawls against a mock Dataverse API
//!
//! These tests use wiremock to stand in for an installation and exercise
//! the HTTP source, the scheduler and hierarchy reconstruction together.

use crate::common::*;
use dvmeta::crawler::VersionPolicy;
use dvmeta::{FailureKind, FetchOperation, VersionState};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_crawl_reconstructs_hierarchy() {
    let mock_server = MockServer::start().await;

    mount_contents(
        &mock_server,
        "root",
        vec![collection_item(2, "Physics"), dataset_item(10, "AAA")],
    )
    .await;
    mount_contents(
        &mock_server,
        "2",
        vec![collection_item(3, "Optics"), dataset_item(11, "BBB")],
    )
    .await;
    mount_contents(&mock_server, "3", vec![dataset_item(12, "CCC")]).await;

    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1024)]).await;
    mount_versions(
        &mock_server,
        "BBB",
        vec![draft_version(), released_version(2, 1, 10)],
    )
    .await;
    mount_versions(&mock_server, "CCC", vec![released_version(3, 0, 5)]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert!(result.failures.is_empty(), "{:?}", result.failures);
    assert!(!result.cancelled);
    assert_eq!(result.collections.len(), 3);
    assert_eq!(result.leaves.len(), 3);

    assert_eq!(result.leaves["10"].state, VersionState::Normal);
    assert_eq!(result.leaves["10"].version.as_deref(), Some("1.0"));
    assert_eq!(result.leaves["10"].persistent_id, pid("AAA"));
    assert_eq!(result.leaves["10"].total_bytes(), 1024);

    // Latest prefers the draft when one exists
    assert_eq!(result.leaves["11"].state, VersionState::Draft);

    assert_eq!(
        result.ancestor_path("12").unwrap(),
        &["root".to_string(), "2".to_string(), "3".to_string()]
    );
    assert_eq!(result.display_path("12").as_deref(), Some("/Physics/Optics"));
    assert_eq!(result.display_path("10").as_deref(), Some("/"));
    assert_eq!(result.collections["3"].parent.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_failed_branch_is_contained() {
    let mock_server = MockServer::start().await;

    mount_contents(
        &mock_server,
        "root",
        vec![
            collection_item(2, "Broken"),
            collection_item(3, "Locked"),
            dataset_item(10, "AAA"),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/dataverses/2/contents"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3) // first attempt plus two retries
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dataverses/3/contents"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert_eq!(result.leaves.len(), 1);
    assert_eq!(result.failures.len(), 2);

    let broken = result.failures.iter().find(|f| f.id == "2").unwrap();
    assert_eq!(broken.operation, FetchOperation::ListChildren);
    assert_eq!(broken.kind, FailureKind::TransientNetwork);

    let locked = result.failures.iter().find(|f| f.id == "3").unwrap();
    assert_eq!(locked.kind, FailureKind::Forbidden);

    // Unlisted subtrees are never reported as empty
    assert!(result.empty_collections.is_empty());
}

#[tokio::test]
async fn test_root_failure_yields_only_the_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/dataverses/missing/contents"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": "ERROR",
            "message": "Can't find dataverse with identifier='missing'"
        })))
        .mount(&mock_server)
        .await;

    let result = crawl_mock(&mock_server, "missing", |options| options).await;

    assert!(result.root_failed());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].kind, FailureKind::NotFound);
    assert!(result.leaves.is_empty());
    assert!(result.empty_collections.is_empty());
}

#[tokio::test]
async fn test_empty_root() {
    let mock_server = MockServer::start().await;
    mount_contents(&mock_server, "root", vec![]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert!(result.failures.is_empty());
    assert!(result.leaves.is_empty());
    assert!(result.empty_collections.contains("root"));
}

#[tokio::test]
async fn test_empty_subtrees_are_detected() {
    let mock_server = MockServer::start().await;

    mount_contents(
        &mock_server,
        "root",
        vec![collection_item(2, "Full"), collection_item(3, "Hollow")],
    )
    .await;
    mount_contents(&mock_server, "2", vec![dataset_item(10, "AAA")]).await;
    mount_contents(&mock_server, "3", vec![collection_item(4, "Inner")]).await;
    mount_contents(&mock_server, "4", vec![]).await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    let empty: Vec<&str> = result.empty_collections.iter().map(String::as_str).collect();
    assert_eq!(empty, vec!["3", "4"]);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let mock_server = MockServer::start().await;

    // Mounted first, so it answers until exhausted
    Mock::given(method("GET"))
        .and(path("/api/dataverses/root/contents"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_contents(&mock_server, "root", vec![dataset_item(10, "AAA")]).await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert!(result.failures.is_empty(), "{:?}", result.failures);
    assert_eq!(result.leaves.len(), 1);
}

#[tokio::test]
async fn test_malformed_envelope() {
    let mock_server = MockServer::start().await;

    mount_contents(&mock_server, "root", vec![dataset_item(10, "AAA")]).await;
    Mock::given(method("GET"))
        .and(path("/api/datasets/:persistentId/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert!(result.leaves.is_empty());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].id, "10");
    assert_eq!(result.failures[0].operation, FetchOperation::FetchLeaf);
    assert_eq!(result.failures[0].kind, FailureKind::MalformedResponse);
    // A dataset was found below the root even though its fetch failed
    assert!(result.empty_collections.is_empty());
}

#[tokio::test]
async fn test_unmatched_version_is_not_found() {
    let mock_server = MockServer::start().await;

    mount_contents(&mock_server, "root", vec![dataset_item(10, "AAA")]).await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;

    let result = crawl_mock(&mock_server, "root", |mut options| {
        options.policy = VersionPolicy::Exact { major: 2, minor: 0 };
        options
    })
    .await;

    assert!(result.leaves.is_empty());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].kind, FailureKind::NotFound);
    assert!(result.failures[0].message.contains("2.0"));
}

#[tokio::test]
async fn test_permissions_send_api_key() {
    let mock_server = MockServer::start().await;

    mount_contents(&mock_server, "root", vec![dataset_item(10, "AAA")]).await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;
    Mock::given(method("GET"))
        .and(path("/api/datasets/10/assignments"))
        .and(header("x-dataverse-key", "secret-token"))
        .respond_with(ok(json!([{"id": 1, "assignee": "@admin", "_roleAlias": "admin"}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = crawl_mock(&mock_server, "root", |options| options.with_permissions(true)).await;

    assert!(result.failures.is_empty(), "{:?}", result.failures);
    assert_eq!(result.permissions["10"][0]["assignee"], "@admin");
}

#[tokio::test]
async fn test_shared_collection_listed_once() {
    let mock_server = MockServer::start().await;

    mount_contents(
        &mock_server,
        "root",
        vec![collection_item(2, "A"), collection_item(3, "B")],
    )
    .await;
    mount_contents(&mock_server, "2", vec![collection_item(4, "Shared")]).await;
    mount_contents(&mock_server, "3", vec![collection_item(4, "Shared")]).await;
    Mock::given(method("GET"))
        .and(path("/api/dataverses/4/contents"))
        .respond_with(ok(json!([dataset_item(10, "AAA")])))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_versions(&mock_server, "AAA", vec![released_version(1, 0, 1)]).await;

    let result = crawl_mock(&mock_server, "root", |options| options).await;

    assert_eq!(result.leaves.len(), 1);
    assert_eq!(result.collections.len(), 4);
    assert_eq!(result.ancestor_path("10").unwrap().len(), 3);
    // Both parents reach the dataset, whichever of them claimed Shared
    assert!(result.empty_collections.is_empty());
}
