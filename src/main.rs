//! Movie Image Proxy - image resizer and caching vendor proxy.
//!
//! This binary starts the HTTP server and wires all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use movie_image_proxy::{
    config::Config,
    create_s3_client,
    proxy::{FailedUrlLog, HttpOrigin, ProxyService},
    server::{create_router, RouterConfig},
    store::{FastCache, MemoryFastCache, RedisFastCache},
    CodecRegistry, ImagePipeline, ImageService, S3BlobStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner(&config);

    // Durable store, shared by both request paths
    let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
    let store = Arc::new(S3BlobStore::new(s3_client, config.s3_bucket.clone()));

    // Process path
    let codecs = Arc::new(CodecRegistry::new());
    let pipeline =
        Arc::new(ImagePipeline::new(codecs).with_max_output_pixels(config.max_output_pixels));
    let image_service = Arc::new(ImageService::with_timeout(
        Arc::clone(&store),
        pipeline,
        config.process_timeout(),
    ));

    // Proxy path
    let (connect_timeout, request_timeout) = config.origin_timeouts();
    let origin = match HttpOrigin::new(connect_timeout, request_timeout) {
        Ok(origin) => Arc::new(origin),
        Err(e) => {
            error!("Failed to build vendor HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let failed_urls = Arc::new(FailedUrlLog::new(&config.failed_urls_path));

    let mut proxy_service = ProxyService::new(Arc::clone(&store), origin, config.proxy_config())
        .with_failed_url_log(Arc::clone(&failed_urls));
    if let Some(fast) = build_fast_cache(&config).await {
        proxy_service = proxy_service.with_fast_cache(fast);
    }
    let proxy_service = Arc::new(proxy_service);

    let router = create_router(
        image_service,
        proxy_service,
        failed_urls,
        build_router_config(&config),
    );

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/images/<entity>/<file>/300/80/webp", addr);
    info!("    curl http://{}/kinopoisk-images/<path>", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Pick the fast tier: Redis when enabled and reachable, otherwise the
/// in-process cache when sized, otherwise none.
async fn build_fast_cache(config: &Config) -> Option<Arc<dyn FastCache>> {
    if config.use_redis_cache {
        let url = config.redis_url.as_deref().unwrap_or_default();
        match RedisFastCache::connect(url).await {
            Ok(cache) => {
                info!("  Fast tier: redis (ttl {}s)", config.redis_cache_ttl);
                return Some(Arc::new(cache));
            }
            Err(e) => {
                warn!("  Failed to connect to Redis: {}", e);
                warn!("  Fast tier: DISABLED - proxy requests go to S3 directly");
                return None;
            }
        }
    }

    if config.memory_cache_bytes > 0 {
        info!(
            "  Fast tier: in-process, {}MB (ttl {}s)",
            config.memory_cache_bytes / (1024 * 1024),
            config.redis_cache_ttl
        );
        return Some(Arc::new(MemoryFastCache::with_capacity(
            config.memory_cache_bytes,
        )));
    }

    info!("  Fast tier: none");
    None
}

/// Print the startup banner and the effective configuration.
fn print_banner(config: &Config) {
    info!("");
    info!("movie-image-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("");
    info!("Configuration:");
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!("  Max output pixels: {}", config.max_output_pixels);
    if config.tmdb_image_proxy.is_empty() {
        warn!("  TMDB proxy: not set - tmdb-images requests will fail");
    } else {
        info!("  TMDB proxy: {}", config.tmdb_image_proxy);
    }
    info!(
        "  Timeouts: process {}s, proxy {}s, backfill {}s",
        config.process_timeout, config.proxy_timeout, config.backfill_timeout
    );
    info!("  Failed URL log: {}", config.failed_urls_path);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "movie_image_proxy=debug,tower_http=debug"
    } else {
        "movie_image_proxy=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
