//! Process service: stored asset in, rendition out.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ImageService                          │
//! │  1. Validate quality      4. Collect source bytes            │
//! │  2. Fetch from store      5. Decode/resize/encode (blocking) │
//! │  3. SVG? pass through     6. Label and return                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The durable store is the only source; a missing asset is a 404, never
//! a vendor fetch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{ImagePipeline, Transform};
use crate::body::{self, BodyStream, Finality};
use crate::error::{CodecError, ProcessError, StoreError};
use crate::format::ImageFormat;
use crate::store::BlobStore;

/// Default deadline for a process request.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Process Request
// =============================================================================

/// A request for a rendition of a stored asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    /// Logical owner of the asset (first key segment)
    pub owner_key: String,

    /// Asset identifier within the owner
    pub asset_key: String,

    /// Target width in pixels; 0 keeps the source width
    pub width: u32,

    /// Encoder quality, 0-100
    pub quality: f32,

    /// Output format
    pub format: ImageFormat,
}

impl ProcessRequest {
    pub fn new(
        owner_key: impl Into<String>,
        asset_key: impl Into<String>,
        width: u32,
        quality: f32,
        format: ImageFormat,
    ) -> Self {
        Self {
            owner_key: owner_key.into(),
            asset_key: asset_key.into(),
            width,
            quality,
            format,
        }
    }

    /// Durable store key of the source asset.
    pub fn blob_key(&self) -> String {
        format!("{}/{}", self.owner_key, self.asset_key)
    }

    fn validate(&self) -> Result<(), ProcessError> {
        if !(0.0..=100.0).contains(&self.quality) {
            return Err(ProcessError::InvalidQuality {
                quality: self.quality,
            });
        }
        Ok(())
    }

    fn transforms(&self) -> Vec<Transform> {
        vec![Transform::Resize(self.width)]
    }
}

// =============================================================================
// Processed Image
// =============================================================================

/// A rendition ready to send.
pub struct ProcessedImage {
    /// Format of `body`; `Svg` for pass-through sources
    pub format: ImageFormat,

    pub content_type: String,

    pub content_length: Option<u64>,

    /// `inline; filename={asset}.{ext}`
    pub content_disposition: String,

    pub body: BodyStream,

    pub finality: Finality,
}

impl fmt::Debug for ProcessedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedImage")
            .field("format", &self.format)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

fn content_disposition(asset_key: &str, format: ImageFormat) -> String {
    format!("inline; filename={}.{}", asset_key, format.extension())
}

fn is_svg(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains(ImageFormat::Svg.mime_type()))
        .unwrap_or(false)
}

// =============================================================================
// Image Service
// =============================================================================

/// Serves renditions of assets held in the durable store.
///
/// # Example
///
/// ```ignore
/// let service = ImageService::new(Arc::new(store), Arc::new(ImagePipeline::new(codecs)));
///
/// let request = ProcessRequest::new("posters", "abc123", 300, 80.0, ImageFormat::Webp);
/// let image = service.process(request).await?;
/// assert_eq!(image.content_disposition, "inline; filename=abc123.webp");
/// ```
pub struct ImageService<B: BlobStore> {
    store: Arc<B>,
    pipeline: Arc<ImagePipeline>,
    timeout: Duration,
}

impl<B: BlobStore> ImageService<B> {
    /// Create a service with the default 10 second deadline.
    pub fn new(store: Arc<B>, pipeline: Arc<ImagePipeline>) -> Self {
        Self::with_timeout(store, pipeline, DEFAULT_PROCESS_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<B>, pipeline: Arc<ImagePipeline>, timeout: Duration) -> Self {
        Self {
            store,
            pipeline,
            timeout,
        }
    }

    /// Produce a rendition for `request`.
    ///
    /// # Errors
    ///
    /// - `InvalidQuality` if quality is outside 0-100
    /// - `NotFound` if the source asset does not exist
    /// - `Codec` for unsupported targets and decode/encode failures
    /// - `Store` for any other store failure
    /// - `Timeout` if the deadline passes first; a pass-through body that
    ///   is still streaming at the deadline ends with an I/O error
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessedImage, ProcessError> {
        request.validate()?;

        let deadline = Instant::now() + self.timeout;
        let mut image = tokio::time::timeout_at(deadline, self.render(&request))
            .await
            .map_err(|_| ProcessError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        image.body = body::with_deadline(image.body, deadline);
        Ok(image)
    }

    async fn render(&self, request: &ProcessRequest) -> Result<ProcessedImage, ProcessError> {
        let key = request.blob_key();

        let object = self.store.get(&key).await.map_err(|e| match e {
            StoreError::NotFound(_) => ProcessError::NotFound { key: key.clone() },
            other => ProcessError::Store(other),
        })?;

        if is_svg(object.content_type.as_deref()) {
            debug!(key = %key, "Serving SVG source as-is");
            return Ok(ProcessedImage {
                format: ImageFormat::Svg,
                content_type: ImageFormat::Svg.mime_type().to_string(),
                content_length: object.content_length,
                content_disposition: content_disposition(&request.asset_key, ImageFormat::Svg),
                body: object.body,
                finality: Finality::Immutable,
            });
        }

        // Fail fast before pulling the source
        self.pipeline.codecs().encoder(request.format)?;

        let source = body::collect(object.body)
            .await
            .map_err(|e| ProcessError::Store(StoreError::Connection(e.to_string())))?;

        let pipeline = Arc::clone(&self.pipeline);
        let transforms = request.transforms();
        let (quality, format) = (request.quality, request.format);

        let encoded = tokio::task::spawn_blocking(move || {
            pipeline.process(&source, &transforms, quality, format)
        })
        .await
        .map_err(|e| CodecError::Encode {
            message: format!("image worker failed: {}", e),
        })??;

        debug!(
            key = %key,
            format = %format,
            width = request.width,
            bytes = encoded.len(),
            "Processed image"
        );

        Ok(ProcessedImage {
            format,
            content_type: format.mime_type().to_string(),
            content_length: Some(encoded.len() as u64),
            content_disposition: content_disposition(&request.asset_key, format),
            body: body::once(encoded),
            finality: Finality::Immutable,
        })
    }
}
