//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                              - Health check
//! /images/{entity}/{file}/{width}/{quality}/{type}     - Processed image
//! /admin/failed-urls                                   - Failure log (GET, DELETE)
//! /{service}/{*path}                                   - Vendor proxy
//! ```
//!
//! Static segments take priority over the `{service}` capture, so the vendor
//! route never shadows the others.
//!
//! # Example
//!
//! ```ignore
//! use movie_image_proxy::server::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(image_service, proxy_service, failed_urls, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    clear_failed_urls_handler, failed_urls_handler, health_handler, process_handler,
    proxy_handler, AppState,
};
use crate::config::DEFAULT_CACHE_MAX_AGE;
use crate::pipeline::ImageService;
use crate::proxy::{FailedUrlLog, Origin, ProxyService};
use crate::store::BlobStore;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for immutable responses
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Whether to gzip compressible responses (images are left alone)
    pub enable_compression: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// By default CORS allows any origin, max-age is one week, and tracing
    /// and compression are on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            enable_compression: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// Both services must share the same durable store type; the store itself is
/// usually shared too.
pub fn create_router<B, O>(
    image_service: Arc<ImageService<B>>,
    proxy_service: Arc<ProxyService<B, O>>,
    failed_urls: Arc<FailedUrlLog>,
    config: RouterConfig,
) -> Router
where
    B: BlobStore,
    O: Origin,
{
    let app_state = AppState::new(
        image_service,
        proxy_service,
        failed_urls,
        config.cache_max_age,
    );

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/images/{entity}/{file}/{width}/{quality}/{type}",
            get(process_handler::<B, O>),
        )
        .route(
            "/admin/failed-urls",
            get(failed_urls_handler::<B, O>).delete(clear_failed_urls_handler::<B, O>),
        )
        .route("/{service}/{*path}", get(proxy_handler::<B, O>))
        .with_state(app_state)
        .layer(cors);

    let router = if config.enable_compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    };

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No allow_origin at all disables cross-origin access
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
