use std::time::Duration;

use serde_json::json;

use schemabound::{ResolveError, Retrieve};
use schemabound_cli::retrieve::{DocumentRetriever, parse_document};

#[test]
fn test_parse_json() {
    assert_eq!(
        parse_document("{\"type\": \"string\"}").expect("json"),
        json!({"type": "string"})
    );
}

#[test]
fn test_parse_yaml() {
    assert_eq!(
        parse_document("type: object\nrequired:\n  - id\n").expect("yaml"),
        json!({"type": "object", "required": ["id"]})
    );
}

#[test]
fn test_parse_invalid() {
    let err = parse_document("{\"type\": [").expect_err("invalid");
    assert!(err.contains("nor YAML"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retrieve_file_path_and_url() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("common.json");
    tokio::fs::write(&path, "{\"definitions\": {}}").await.expect("write");
    let retriever = DocumentRetriever::new(Duration::from_secs(1)).expect("retriever");

    let plain = path.to_string_lossy().into_owned();
    let url = url::Url::from_file_path(&path).expect("file url").to_string();
    let (by_path, by_url) = tokio::task::spawn_blocking(move || {
        (retriever.retrieve(&plain), retriever.retrieve(&url))
    })
    .await
    .expect("join");
    assert_eq!(by_path.expect("by path"), json!({"definitions": {}}));
    assert_eq!(by_url.expect("by url"), json!({"definitions": {}}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retrieve_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing.json").to_string_lossy().into_owned();
    let retriever = DocumentRetriever::new(Duration::from_secs(1)).expect("retriever");
    let result = tokio::task::spawn_blocking(move || retriever.retrieve(&path))
        .await
        .expect("join");
    assert!(matches!(result, Err(ResolveError::Unretrievable { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retrieve_unsupported_scheme() {
    let retriever = DocumentRetriever::new(Duration::from_secs(1)).expect("retriever");
    let result = tokio::task::spawn_blocking(move || retriever.retrieve("ftp://example.com/a.json"))
        .await
        .expect("join");
    let err = result.expect_err("unsupported");
    assert!(err.to_string().contains("unsupported scheme `ftp`"));
}
