//! Caching proxy for vendor artwork.
//!
//! - [`vendor`]: service tokens, upstream URLs and cache keys
//! - [`origin`]: HTTP access to the vendors
//! - [`service`]: the tier walk (fast cache, durable store, vendor)
//! - [`tee`] and [`backfill`]: serving a body while writing it back
//! - [`failed_urls`]: the operator-facing failure log

pub mod backfill;
pub mod failed_urls;
pub mod origin;
mod service;
pub mod tee;
pub mod vendor;

pub use backfill::{
    BackfillOutcome, BackfillTarget, Backfiller, DEFAULT_BACKFILL_TIMEOUT, DEFAULT_FAST_CACHE_TTL,
    DEFAULT_MAX_BACKFILL_BYTES,
};
pub use failed_urls::{FailedUrlLog, DEFAULT_FAILED_URLS_PATH};
pub use origin::{HttpOrigin, Origin, OriginResponse, DEFAULT_CONNECT_TIMEOUT};
pub use service::{ProxyConfig, ProxyResponse, ProxyService, Tier, DEFAULT_PROXY_TIMEOUT};
pub use tee::{tee, Feed};
pub use vendor::{CacheKey, VendorService};
