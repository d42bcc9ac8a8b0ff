//! Error mapping of the S3 adapter

use std::time::Duration;

use kdrive_core::ports::{IObjectStore, StoreError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, bucket, BUCKET};

#[tokio::test]
async fn test_missing_key_maps_to_not_found() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_error(&server, "GET", &format!("/{BUCKET}/ghost.txt"), 404, "NoSuchKey").await;

    let err = store.get(&bucket(), "ghost.txt").await.unwrap_err();

    assert_eq!(
        err,
        StoreError::NotFound {
            bucket: BUCKET.into(),
            key: "ghost.txt".into()
        }
    );
}

#[tokio::test]
async fn test_missing_bucket_maps_to_bucket_not_found() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_error(&server, "GET", &format!("/{BUCKET}"), 404, "NoSuchBucket").await;

    let err = store.list(&bucket()).await.unwrap_err();
    assert_eq!(err, StoreError::BucketNotFound(BUCKET.into()));
}

#[tokio::test]
async fn test_forbidden_maps_to_access_denied() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_error(&server, "GET", &format!("/{BUCKET}"), 403, "AccessDenied").await;

    let err = store.list(&bucket()).await.unwrap_err();
    assert!(matches!(err, StoreError::AccessDenied(_)), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_service_unavailable_is_transient() {
    let (server, store) = common::setup_s3_mock().await;
    common::mount_error(&server, "PUT", &format!("/{BUCKET}/a.txt"), 503, "SlowDown").await;

    let err = store.put(&bucket(), "a.txt", b"x").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let (server, store) = common::setup_s3_mock().await;
    drop(server);

    let err = store.list(&bucket()).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn test_stalled_response_times_out_as_transient() {
    let (server, store) = common::setup_s3_mock_with_timeout(Duration::from_millis(200)).await;
    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(common::list_body(&["a.txt"], None))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let err = store.list(&bucket()).await.unwrap_err();

    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}
