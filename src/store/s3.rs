//! S3 durable store.
//!
//! Objects stream straight from the SDK body. Not-found is recognized from
//! the service error or a 404 status.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use super::{BlobMetadata, BlobObject, BlobStore};
use crate::body::BodyStream;
use crate::error::StoreError;

/// S3-backed implementation of [`BlobStore`].
///
/// Works with AWS S3 and S3-compatible services (MinIO, R2, Ceph). Object
/// keys are used as given; the bucket is fixed at construction.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a store for the given bucket.
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<BlobObject, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                map_sdk_error(e, no_such_key, || self.location(key))
            })?;

        Ok(BlobObject {
            content_type: resp.content_type().map(str::to_string),
            content_length: resp.content_length().and_then(|len| u64::try_from(len).ok()),
            body: byte_stream_body(resp.body),
        })
    }

    async fn head(&self, key: &str) -> Result<Option<BlobMetadata>, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(head) => Ok(Some(BlobMetadata {
                content_type: head.content_type().map(str::to_string),
                content_length: head.content_length().unwrap_or(0).max(0) as u64,
            })),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                match map_sdk_error(e, not_found, || self.location(key)) {
                    StoreError::NotFound(_) => Ok(None),
                    other => Err(other),
                }
            }
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(data.len() as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, false, || self.location(key)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, false, || self.location(key)))?;

        Ok(())
    }
}

/// Classify an SDK error.
///
/// `service_not_found` carries the operation-specific not-found check,
/// since each operation has its own error type. A 404 status or a
/// not-found error code in the message also counts.
fn map_sdk_error<E>(
    err: SdkError<E, HttpResponse>,
    service_not_found: bool,
    location: impl FnOnce() -> String,
) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status_is_404 = err
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false);

    if service_not_found || status_is_404 {
        return StoreError::NotFound(location());
    }

    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StoreError::Connection(format!("{}: {}", location(), DisplayErrorContext(&err)))
        }
        _ => {
            let err_str = DisplayErrorContext(&err).to_string();
            if err_str.contains("NotFound") || err_str.contains("NoSuchKey") {
                StoreError::NotFound(location())
            } else {
                StoreError::Backend(format!("{}: {}", location(), err_str))
            }
        }
    }
}

/// Adapt the SDK's body into a [`BodyStream`].
fn byte_stream_body(body: ByteStream) -> BodyStream {
    stream::try_unfold(body, |mut body| async move {
        match body.try_next().await {
            Ok(Some(chunk)) => Ok(Some((chunk, body))),
            Ok(None) => Ok(None),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
        }
    })
    .boxed()
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // Custom endpoints are addressed path-style
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
