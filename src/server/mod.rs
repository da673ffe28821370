//! HTTP server layer.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          HTTP Layer                              │
//! │   /images/...           /{service}/...          /admin/...       │
//! │        │                      │                      │           │
//! │  ┌─────▼──────┐        ┌──────▼───────┐      ┌───────▼───────┐   │
//! │  │ImageService│        │ ProxyService │      │ FailedUrlLog  │   │
//! │  └────────────┘        └──────────────┘      └───────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    clear_failed_urls_handler, failed_urls_handler, health_handler, process_handler,
    proxy_handler, AppState, ErrorResponse, HandlerError, HealthResponse, ImagePathParams,
    MessageResponse, ProxyPathParams,
};
pub use routes::{create_router, RouterConfig};
