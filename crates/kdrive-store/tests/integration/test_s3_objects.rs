//! Listing, fetching and writing objects through the S3 adapter

use chrono::{TimeZone, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use kdrive_core::ports::IObjectStore;

use crate::common::{self, bucket, BUCKET};

// ============================================================================
// list
// ============================================================================

#[tokio::test]
async fn test_list_returns_all_keys() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_list(&server, &["a.txt", "b.txt"]).await;

    let mut keys = store.list(&bucket()).await.expect("list failed");
    keys.sort();

    assert_eq!(keys, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_list_empty_bucket() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_list(&server, &[]).await;

    let keys = store.list(&bucket()).await.expect("list failed");
    assert!(keys.is_empty());
}

#[tokio::test]
async fn test_list_follows_continuation_tokens() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_list_paginated(&server, &["a.txt", "b.txt"], &["c.txt"]).await;

    let mut keys = store.list(&bucket()).await.expect("list failed");
    keys.sort();

    assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt"]);
}

// ============================================================================
// get
// ============================================================================

#[tokio::test]
async fn test_get_returns_content_and_last_modified() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_object(&server, "a.txt", b"hello", "Wed, 21 Oct 2015 07:28:00 GMT").await;

    let object = store.get(&bucket(), "a.txt").await.expect("get failed");

    assert_eq!(object.data, b"hello");
    assert_eq!(
        object.last_modified,
        Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap()
    );
}

#[tokio::test]
async fn test_get_empty_object() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_object(&server, "empty.txt", b"", "Wed, 21 Oct 2015 07:28:00 GMT").await;

    let object = store.get(&bucket(), "empty.txt").await.expect("get failed");
    assert!(object.data.is_empty());
}

// ============================================================================
// put
// ============================================================================

#[tokio::test]
async fn test_put_sends_object() {
    let (server, store) = common::setup_s3_mock().await;
    Mock::given(method("PUT"))
        .and(path(format!("/{BUCKET}/a.txt")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store
        .put(&bucket(), "a.txt", b"hello")
        .await
        .expect("put failed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method.as_str(), "PUT");
}
