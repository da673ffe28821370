//! Configuration management.
//!
//! All options come from command-line flags with environment variable
//! fallbacks, so the service can be configured entirely from a container
//! environment.
//!
//! # Environment Variables
//!
//! - `HOST` - Server bind address (default: 0.0.0.0)
//! - `PORT` - Server port (default: 8080)
//! - `S3_BUCKET` - Bucket holding uploads and proxied assets (required)
//! - `S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `S3_REGION` - AWS region (default: us-east-1)
//! - `TMDB_IMAGE_PROXY` - Forwarding proxy prefix for TMDB requests
//! - `USE_REDIS_CACHE` - Enable the Redis fast tier (default: false)
//! - `REDIS_URL` - Redis connection URL
//! - `REDIS_CACHE_TTL` - Fast tier TTL in seconds (default: 600)
//! - `MEMORY_CACHE_BYTES` - In-process fast tier size when Redis is off (default: 0, disabled)
//! - `CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 604800)
//! - `MAX_OUTPUT_PIXELS` - Largest rendition in pixels (default: 40000000)
//! - `PROCESS_TIMEOUT` - Process request deadline in seconds (default: 10)
//! - `PROXY_TIMEOUT` - Proxy request deadline in seconds (default: 300)
//! - `BACKFILL_TIMEOUT` - Backfill job deadline in seconds (default: 60)
//! - `MAX_BACKFILL_BYTES` - Largest object written back (default: 20MB)
//! - `FAILED_URLS_PATH` - Vendor failure log (default: failed_urls.txt)
//! - `CORS_ORIGINS` - Allowed CORS origins, comma-separated (default: any)

use std::time::Duration;

use clap::Parser;

use crate::pipeline::DEFAULT_MAX_OUTPUT_PIXELS;

use crate::proxy::{
    ProxyConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FAILED_URLS_PATH, DEFAULT_MAX_BACKFILL_BYTES,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default fast tier TTL in seconds (10 minutes).
pub const DEFAULT_REDIS_CACHE_TTL: u64 = 600;

/// Default HTTP cache max-age in seconds (1 week).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 604_800;

/// Default process request deadline in seconds.
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 10;

/// Default proxy request deadline in seconds.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 300;

/// Default backfill deadline in seconds.
pub const DEFAULT_BACKFILL_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Movie Image Proxy - image resizer and caching vendor proxy.
///
/// Serves resized and re-encoded renditions of images stored in S3, and
/// proxies TMDB/Kinopoisk artwork through a Redis and S3 cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "movie-image-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// S3 bucket holding uploaded images and proxied vendor assets.
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Vendor Configuration
    // =========================================================================
    /// Forwarding proxy for TMDB image requests.
    ///
    /// TMDB URLs are requested as `{proxy}?url=https://www.themoviedb.org/t/p/{path}`.
    #[arg(long, default_value = "", env = "TMDB_IMAGE_PROXY")]
    pub tmdb_image_proxy: String,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Put a Redis fast tier in front of S3 for proxied assets.
    #[arg(long, default_value_t = false, env = "USE_REDIS_CACHE")]
    pub use_redis_cache: bool,

    /// Redis connection URL (e.g. redis://localhost:6379/0).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Fast tier entry TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_REDIS_CACHE_TTL, env = "REDIS_CACHE_TTL")]
    pub redis_cache_ttl: u64,

    /// Size in bytes of an in-process fast tier, used when Redis is off.
    ///
    /// 0 disables it.
    #[arg(long, default_value_t = 0, env = "MEMORY_CACHE_BYTES")]
    pub memory_cache_bytes: usize,

    /// HTTP Cache-Control max-age in seconds for immutable responses.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Largest vendor object written back to the cache tiers, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BACKFILL_BYTES, env = "MAX_BACKFILL_BYTES")]
    pub max_backfill_bytes: usize,

    /// Largest rendition the process path will produce, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_PIXELS, env = "MAX_OUTPUT_PIXELS")]
    pub max_output_pixels: u64,

    // =========================================================================
    // Timeouts
    // =========================================================================
    /// Deadline for process requests, in seconds.
    #[arg(long, default_value_t = DEFAULT_PROCESS_TIMEOUT_SECS, env = "PROCESS_TIMEOUT")]
    pub process_timeout: u64,

    /// Deadline for proxy requests including the response body, in seconds.
    #[arg(long, default_value_t = DEFAULT_PROXY_TIMEOUT_SECS, env = "PROXY_TIMEOUT")]
    pub proxy_timeout: u64,

    /// Deadline for one background write-back, in seconds.
    #[arg(long, default_value_t = DEFAULT_BACKFILL_TIMEOUT_SECS, env = "BACKFILL_TIMEOUT")]
    pub backfill_timeout: u64,

    // =========================================================================
    // Diagnostics
    // =========================================================================
    /// File that vendor fetch failures are appended to.
    #[arg(long, default_value = DEFAULT_FAILED_URLS_PATH, env = "FAILED_URLS_PATH")]
    pub failed_urls_path: String,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.is_empty() {
            return Err("S3 bucket name is required. Set --s3-bucket or S3_BUCKET".to_string());
        }

        if self.use_redis_cache && self.redis_url.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Redis cache is enabled but no URL provided. \
                 Set --redis-url or REDIS_URL, or unset USE_REDIS_CACHE"
                    .to_string(),
            );
        }

        if !self.tmdb_image_proxy.is_empty() && url::Url::parse(&self.tmdb_image_proxy).is_err()
        {
            return Err(format!(
                "tmdb_image_proxy is not a valid URL: {}",
                self.tmdb_image_proxy
            ));
        }

        if self.redis_cache_ttl == 0 {
            return Err("redis_cache_ttl must be greater than 0".to_string());
        }

        if self.process_timeout == 0 {
            return Err("process_timeout must be greater than 0".to_string());
        }
        if self.proxy_timeout == 0 {
            return Err("proxy_timeout must be greater than 0".to_string());
        }
        if self.backfill_timeout == 0 {
            return Err("backfill_timeout must be greater than 0".to_string());
        }

        if self.max_backfill_bytes == 0 {
            return Err("max_backfill_bytes must be greater than 0".to_string());
        }

        if self.max_output_pixels == 0 {
            return Err("max_output_pixels must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout)
    }

    /// Timeouts for the vendor HTTP client: (connect, whole request).
    pub fn origin_timeouts(&self) -> (Duration, Duration) {
        (
            DEFAULT_CONNECT_TIMEOUT,
            Duration::from_secs(self.proxy_timeout),
        )
    }

    /// Proxy service tunables derived from this configuration.
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            tmdb_proxy: self.tmdb_image_proxy.clone(),
            timeout: Duration::from_secs(self.proxy_timeout),
            fast_cache_ttl: Duration::from_secs(self.redis_cache_ttl),
            backfill_timeout: Duration::from_secs(self.backfill_timeout),
            max_backfill_bytes: self.max_backfill_bytes,
            ..ProxyConfig::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
