use thiserror::Error;

use crate::format::ImageFormat;

/// Errors from the durable blob store or the fast cache tier.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error reported by S3, Redis or another backing service
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// True for the one store outcome that is a cache miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors from format parsing, decoding and encoding.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The requested format token is not one we know
    #[error("Unknown image format: {0}")]
    UnknownFormat(String),

    /// No encoder is registered for the format (should map to HTTP 415)
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(ImageFormat),

    /// Source bytes could not be decoded
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// The target codec failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// The requested output exceeds the pixel budget
    #[error("Output {width}x{height} exceeds the limit of {max_pixels} pixels")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}

/// Errors on the process path (stored asset -> transformed image).
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// Quality outside 0-100
    #[error("Invalid quality: {quality} (must be 0-100)")]
    InvalidQuality { quality: f32 },

    /// The asset does not exist in the durable store
    #[error("Image not found: {key}")]
    NotFound { key: String },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The request did not complete within the process deadline
    #[error("Processing timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Errors reaching a vendor origin.
#[derive(Debug, Clone, Error)]
pub enum OriginError {
    /// DNS, TLS, connection reset and similar failures
    #[error("Connection error: {0}")]
    Connection(String),

    /// The vendor did not answer in time
    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Errors on the proxy path.
///
/// A vendor answering with a non-200 status is not an error: the status is
/// forwarded to the caller in the proxy response.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// The service token is not one of the known vendors
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The vendor could not be reached
    #[error("Vendor unavailable at {url}: {source}")]
    VendorUnavailable {
        url: String,
        #[source]
        source: OriginError,
    },

    /// A non-NotFound failure from the durable store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request did not complete within the proxy deadline
    #[error("Proxy request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}
