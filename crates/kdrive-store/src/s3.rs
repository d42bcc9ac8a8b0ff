//! S3ObjectStore - IObjectStore implementation for Amazon S3
//!
//! Credentials and region come from the default AWS provider chain
//! (environment, shared config files, instance metadata), with optional
//! overrides from the `storage` configuration section for S3-compatible
//! endpoints.
//!
//! ## Design Notes
//!
//! - The SDK's own retry layer is disabled. Transient failures surface as
//!   [`StoreError::Unavailable`] and the engine's transfer executor applies
//!   its configured backoff, so one policy governs every attempt.
//! - Every call is bounded by `storage.operation_timeout`; a hung
//!   connection surfaces as a timeout error instead of stalling a loop.
//! - `list` pages through `ListObjectsV2` continuation tokens and returns
//!   the full key set.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use kdrive_core::config::StorageConfig;
use kdrive_core::domain::BucketName;
use kdrive_core::ports::{IObjectStore, RemoteObject, StoreError};

// ============================================================================
// S3ObjectStore
// ============================================================================

/// Object store backed by an S3 client
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Wraps an already configured client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS chain plus `config` overrides
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .retry_config(RetryConfig::disabled())
            .timeout_config(Self::timeouts(Duration::from_secs(
                config.operation_timeout.max(1),
            )));
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(Client::from_conf(builder.build()))
    }

    /// Caps both the connect phase and the whole operation at `limit`
    pub fn timeouts(limit: Duration) -> TimeoutConfig {
        TimeoutConfig::builder()
            .connect_timeout(limit)
            .operation_timeout(limit)
            .build()
    }

    /// Returns the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait::async_trait]
impl IObjectStore for S3ObjectStore {
    fn provider_name(&self) -> &'static str {
        "s3"
    }

    async fn list(&self, bucket: &BucketName) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket.as_str())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, None))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(bucket = %bucket, count = keys.len(), "Listed bucket");
        Ok(keys)
    }

    async fn get(&self, bucket: &BucketName, key: &str) -> Result<RemoteObject, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket.as_str())
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;

        let last_modified = match response.last_modified() {
            Some(ts) => DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
                .unwrap_or_else(Utc::now),
            None => {
                warn!(bucket = %bucket, key, "Object has no Last-Modified header");
                Utc::now()
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unavailable(format!("reading body of {key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(RemoteObject {
            data,
            last_modified,
        })
    }

    async fn put(&self, bucket: &BucketName, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket.as_str())
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;

        debug!(bucket = %bucket, key, size = data.len(), "Put object");
        Ok(())
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Error codes S3 uses for credential problems
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

/// Error codes S3 uses to ask the client to back off
const THROTTLING_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "ServiceUnavailable",
    "InternalError",
];

/// Maps an SDK failure onto the port's error taxonomy
fn map_sdk_error<E>(
    err: SdkError<E, HttpResponse>,
    bucket: &BucketName,
    key: Option<&str>,
) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            return StoreError::Unavailable(message);
        }
        SdkError::ConstructionFailure(_) => return StoreError::Other(message),
        _ => {}
    }

    classify(status, code.as_deref(), bucket, key, message)
}

fn classify(
    status: Option<u16>,
    code: Option<&str>,
    bucket: &BucketName,
    key: Option<&str>,
    message: String,
) -> StoreError {
    if code == Some("NoSuchBucket") {
        return StoreError::BucketNotFound(bucket.to_string());
    }
    if code == Some("NoSuchKey") || (status == Some(404) && key.is_some()) {
        return StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.unwrap_or_default().to_string(),
        };
    }
    if status == Some(404) {
        return StoreError::BucketNotFound(bucket.to_string());
    }
    if matches!(status, Some(401) | Some(403))
        || code.is_some_and(|c| ACCESS_DENIED_CODES.contains(&c))
    {
        return StoreError::AccessDenied(message);
    }
    if matches!(status, Some(429) | Some(500..=599))
        || code.is_some_and(|c| THROTTLING_CODES.contains(&c))
    {
        return StoreError::Unavailable(message);
    }
    StoreError::Other(message)
}
