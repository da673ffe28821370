//! # Movie Image Proxy
//!
//! Image delivery for a movie-database application.
//!
//! Two request paths share one S3 bucket:
//!
//! - **Process**: fetch an uploaded image by key, optionally resize it to a
//!   target width, and re-encode it as WebP, AVIF, JPEG or PNG at a caller
//!   chosen quality. SVG sources are passed through untouched.
//! - **Proxy**: serve TMDB and Kinopoisk artwork through a fast cache tier
//!   (Redis or in-process) and the durable S3 store, falling back to the
//!   vendor and writing the result back to every tier that missed while the
//!   bytes stream to the client.
//!
//! ## Architecture
//!
//! - [`mod@format`] - Output formats and content sniffing
//! - [`codec`] - Encoder registry (WebP, AVIF, JPEG, PNG)
//! - [`pipeline`] - Decode, resize, encode, and the process service
//! - [`store`] - Durable blob store (S3) and fast cache tiers
//! - [`proxy`] - Vendor resolution, tee and backfill, failure log
//! - [`body`] - Streaming body helpers shared by both paths
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use movie_image_proxy::{
//!     create_router, create_s3_client, CodecRegistry, FailedUrlLog, HttpOrigin, ImagePipeline,
//!     ImageService, ProxyConfig, ProxyService, RouterConfig, S3BlobStore,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = create_s3_client(None, "us-east-1").await;
//! let store = Arc::new(S3BlobStore::new(client, "images".to_string()));
//!
//! let pipeline = Arc::new(ImagePipeline::new(Arc::new(CodecRegistry::new())));
//! let images = Arc::new(ImageService::new(Arc::clone(&store), pipeline));
//!
//! let origin = Arc::new(HttpOrigin::new(
//!     std::time::Duration::from_secs(10),
//!     std::time::Duration::from_secs(300),
//! )?);
//! let proxy = Arc::new(ProxyService::new(store, origin, ProxyConfig::default()));
//!
//! let failed_urls = Arc::new(FailedUrlLog::new("failed_urls.txt"));
//! let router = create_router(images, proxy, failed_urls, RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod proxy;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use body::{BodyStream, Finality};
pub use codec::{CodecRegistry, Encoder};
pub use config::Config;
pub use error::{CodecError, OriginError, ProcessError, ProxyError, StoreError};
pub use format::{classify, ImageFormat, Validity};
pub use pipeline::{ImagePipeline, ImageService, ProcessRequest, ProcessedImage, Transform};
pub use proxy::{
    CacheKey, FailedUrlLog, HttpOrigin, Origin, OriginResponse, ProxyConfig, ProxyResponse,
    ProxyService, Tier, VendorService,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use store::{
    create_s3_client, BlobMetadata, BlobObject, BlobStore, FastCache, MemoryFastCache,
    RedisFastCache, S3BlobStore,
};
