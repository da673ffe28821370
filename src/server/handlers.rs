//! HTTP request handlers for the image resizer and vendor proxy.
//!
//! # Endpoints
//!
//! - `GET /images/{entity}/{file}/{width}/{quality}/{type}` - Render a stored image
//! - `GET /{service}/{*path}` - Proxy vendor artwork through the cache tiers
//! - `GET /admin/failed-urls` - Download the vendor failure log
//! - `DELETE /admin/failed-urls` - Clear the vendor failure log
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::body::{BodyStream, Finality};
use crate::error::{CodecError, OriginError, ProcessError, ProxyError, StoreError};
use crate::format::ImageFormat;
use crate::pipeline::{ImageService, ProcessRequest};
use crate::proxy::{FailedUrlLog, Origin, ProxyService, VendorService};
use crate::store::BlobStore;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers via Axum's State extractor.
pub struct AppState<B: BlobStore, O: Origin> {
    /// Renders stored images
    pub image_service: Arc<ImageService<B>>,

    /// Resolves vendor artwork through the cache tiers
    pub proxy_service: Arc<ProxyService<B, O>>,

    /// Operator-facing log of vendor failures
    pub failed_urls: Arc<FailedUrlLog>,

    /// Cache-Control max-age in seconds for immutable responses
    pub cache_max_age: u32,
}

impl<B: BlobStore, O: Origin> AppState<B, O> {
    pub fn new(
        image_service: Arc<ImageService<B>>,
        proxy_service: Arc<ProxyService<B, O>>,
        failed_urls: Arc<FailedUrlLog>,
        cache_max_age: u32,
    ) -> Self {
        Self {
            image_service,
            proxy_service,
            failed_urls,
            cache_max_age,
        }
    }

    /// Cache-Control value for a response of the given finality.
    pub fn cache_control(&self, finality: Finality) -> String {
        match finality {
            Finality::Immutable => format!("public, max-age={}, immutable", self.cache_max_age),
            Finality::Retryable => "no-store".to_string(),
        }
    }
}

impl<B: BlobStore, O: Origin> Clone for AppState<B, O> {
    fn clone(&self) -> Self {
        Self {
            image_service: Arc::clone(&self.image_service),
            proxy_service: Arc::clone(&self.proxy_service),
            failed_urls: Arc::clone(&self.failed_urls),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for image requests.
///
/// Extracted from: `/images/{entity}/{file}/{width}/{quality}/{type}`.
/// Width and quality are kept as strings so a malformed value gets the JSON
/// error body rather than the extractor's plain-text rejection.
#[derive(Debug, Deserialize)]
pub struct ImagePathParams {
    /// Owning entity (first segment of the stored key)
    pub entity: String,

    /// Asset identifier within the entity
    pub file: String,

    /// Target width in pixels, 0 keeps the source width
    pub width: String,

    /// Encoder quality, 0-100, fractional values allowed
    pub quality: String,

    /// Output format token (webp, avif, jpeg, png, svg)
    #[serde(rename = "type")]
    pub format: String,
}

impl ImagePathParams {
    /// Parse into a process request.
    pub fn to_request(&self) -> Result<ProcessRequest, HandlerError> {
        let width = self
            .width
            .parse::<u32>()
            .map_err(|_| HandlerError::invalid_parameter("width", &self.width))?;
        let quality = self
            .quality
            .parse::<f32>()
            .map_err(|_| HandlerError::invalid_parameter("quality", &self.quality))?;
        let format = self.format.parse::<ImageFormat>()?;

        Ok(ProcessRequest::new(
            self.entity.as_str(),
            self.file.as_str(),
            width,
            quality,
            format,
        ))
    }
}

/// Path parameters for proxy requests: `/{service}/{*path}`.
#[derive(Debug, Deserialize)]
pub struct ProxyPathParams {
    /// Vendor service token
    pub service: String,

    /// Vendor path, forwarded after normalization
    pub path: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_quality")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Plain acknowledgement for admin actions.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log an error by severity and render it as JSON.
///
/// 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

fn store_error_parts(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        StoreError::Connection(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_unavailable"),
    }
}

fn codec_error_parts(err: &CodecError) -> (StatusCode, &'static str) {
    match err {
        CodecError::UnknownFormat(_) => (StatusCode::BAD_REQUEST, "unknown_format"),
        CodecError::UnsupportedFormat(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
        }
        CodecError::Decode { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "decode_error"),
        CodecError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        CodecError::TooLarge { .. } => (StatusCode::BAD_REQUEST, "image_too_large"),
    }
}

impl IntoResponse for CodecError {
    fn into_response(self) -> Response {
        let (status, error_type) = codec_error_parts(&self);
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ProcessError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
            ProcessError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ProcessError::Store(err) => store_error_parts(err),
            ProcessError::Codec(err) => codec_error_parts(err),
            ProcessError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ProxyError::UnknownService(_) => (StatusCode::BAD_REQUEST, "unknown_service"),
            ProxyError::VendorUnavailable {
                source: OriginError::Timeout(_),
                ..
            } => (StatusCode::GATEWAY_TIMEOUT, "vendor_timeout"),
            ProxyError::VendorUnavailable { .. } => (StatusCode::BAD_GATEWAY, "vendor_unavailable"),
            // A store miss never surfaces here, so every store error is a 500
            ProxyError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ProxyError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };
        error_response(status, error_type, self.to_string())
    }
}

/// Error type returned by all handlers.
#[derive(Debug)]
pub enum HandlerError {
    Process(ProcessError),
    Proxy(ProxyError),
    Codec(CodecError),

    /// A path parameter that does not parse
    InvalidParameter { name: &'static str, value: String },

    /// A value that cannot be carried in a response header
    InvalidHeader { name: &'static str },

    /// Failed-URL log I/O
    Log(std::io::Error),
}

impl HandlerError {
    fn invalid_parameter(name: &'static str, value: &str) -> Self {
        HandlerError::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Process(err) => err.into_response(),
            HandlerError::Proxy(err) => err.into_response(),
            HandlerError::Codec(err) => err.into_response(),
            HandlerError::InvalidParameter { name, value } => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_parameter",
                format!("Invalid {}: {}", name, value),
            ),
            HandlerError::InvalidHeader { name } => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_header",
                format!("Value for {} is not a valid header", name),
            ),
            HandlerError::Log(err) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "log_error",
                format!("Failed URL log error: {}", err),
            ),
        }
    }
}

impl From<ProcessError> for HandlerError {
    fn from(err: ProcessError) -> Self {
        HandlerError::Process(err)
    }
}

impl From<ProxyError> for HandlerError {
    fn from(err: ProxyError) -> Self {
        HandlerError::Proxy(err)
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        HandlerError::Codec(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::Log(err)
    }
}

// =============================================================================
// Response Building
// =============================================================================

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, HandlerError> {
    HeaderValue::from_str(value).map_err(|_| HandlerError::InvalidHeader { name })
}

/// Headers shared by image and proxy responses.
fn body_headers(
    content_type: &str,
    content_length: Option<u64>,
    cache_control: &str,
) -> Result<HeaderMap, HandlerError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header_value("Content-Type", content_type)?,
    );
    if let Some(length) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    headers.insert(
        header::CACHE_CONTROL,
        header_value("Cache-Control", cache_control)?,
    );
    Ok(headers)
}

fn stream_body(body: BodyStream) -> Body {
    Body::from_stream(body)
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image requests.
///
/// # Endpoint
///
/// `GET /images/{entity}/{file}/{width}/{quality}/{type}`
///
/// # Response
///
/// - `200 OK`: the rendition, or the stored bytes for `svg`
/// - `400 Bad Request`: unknown format, bad width, quality outside 0-100
/// - `404 Not Found`: no stored asset at `{entity}/{file}`
/// - `415 Unsupported Media Type`: no encoder for the format
/// - `422 Unprocessable Entity`: stored bytes are not a decodable image
/// - `504 Gateway Timeout`: processing deadline exceeded
///
/// # Headers
///
/// - `Content-Type`, `Content-Length` (when known)
/// - `Content-Disposition: inline; filename={file}.{type}`
/// - `Cache-Control: public, max-age={cache_max_age}, immutable`
pub async fn process_handler<B: BlobStore, O: Origin>(
    State(state): State<AppState<B, O>>,
    Path(params): Path<ImagePathParams>,
) -> Result<Response, HandlerError> {
    let request = params.to_request()?;
    let image = state.image_service.process(request).await?;

    let mut headers = body_headers(
        &image.content_type,
        image.content_length,
        &state.cache_control(image.finality),
    )?;
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value("Content-Disposition", &image.content_disposition)?,
    );

    Ok((StatusCode::OK, headers, stream_body(image.body)).into_response())
}

/// Handle vendor proxy requests.
///
/// # Endpoint
///
/// `GET /{service}/{*path}` where service is one of `tmdb-images`,
/// `kinopoisk-images`, `kinopoisk-ott-images`, `kinopoisk-st-images`.
///
/// # Response
///
/// - `200 OK`: the artwork, from whichever tier had it
/// - vendor status: forwarded verbatim with an empty body and `no-store`
/// - `400 Bad Request`: unknown service
/// - `502 Bad Gateway` / `504 Gateway Timeout`: vendor unreachable
pub async fn proxy_handler<B: BlobStore, O: Origin>(
    State(state): State<AppState<B, O>>,
    Path(params): Path<ProxyPathParams>,
) -> Result<Response, HandlerError> {
    let service = params.service.parse::<VendorService>()?;
    let response = state.proxy_service.proxy(service, &params.path).await?;

    let content_type = response
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    let mut headers = body_headers(
        content_type,
        response.content_length,
        &state.cache_control(response.finality),
    )?;
    headers.insert(
        "x-cache-source",
        HeaderValue::from_static(response.source.as_str()),
    );

    Ok((response.status, headers, stream_body(response.body)).into_response())
}

/// Download the vendor failure log.
///
/// # Endpoint
///
/// `GET /admin/failed-urls`
///
/// # Response
///
/// - `200 OK`: `text/plain` attachment, one failure per line
/// - `404 Not Found`: nothing has been recorded yet
pub async fn failed_urls_handler<B: BlobStore, O: Origin>(
    State(state): State<AppState<B, O>>,
) -> Result<Response, HandlerError> {
    let Some(contents) = state.failed_urls.read().await? else {
        return Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "No failed URLs have been recorded".to_string(),
        ));
    };

    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"failed_urls.txt\"",
        ),
        (header::CACHE_CONTROL, "no-store"),
    ];
    Ok((StatusCode::OK, headers, contents).into_response())
}

/// Clear the vendor failure log.
///
/// # Endpoint
///
/// `DELETE /admin/failed-urls`
pub async fn clear_failed_urls_handler<B: BlobStore, O: Origin>(
    State(state): State<AppState<B, O>>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state.failed_urls.clear().await?;
    debug!(path = %state.failed_urls.path().display(), "Failed URL log cleared");

    Ok(Json(MessageResponse {
        message: "Failed URL log cleared".to_string(),
    }))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
