//! HTTP API tests driving the router directly.

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use movie_image_proxy::codec::CodecRegistry;
use movie_image_proxy::pipeline::{ImagePipeline, ImageService};
use movie_image_proxy::proxy::{FailedUrlLog, ProxyConfig, ProxyService};
use movie_image_proxy::server::{create_router, RouterConfig};

use super::test_utils::{jpeg_bytes, png_bytes, wait_for_object, MemoryBlobStore, MockOrigin};

struct TestApp {
    router: Router,
    store: Arc<MemoryBlobStore>,
    origin: Arc<MockOrigin>,
    log: Arc<FailedUrlLog>,
    _dir: TempDir,
}

fn app_with(origin: MockOrigin) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FailedUrlLog::new(dir.path().join("failed_urls.txt")));

    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(origin);

    let pipeline = Arc::new(ImagePipeline::new(Arc::new(CodecRegistry::new())));
    let images = Arc::new(ImageService::new(Arc::clone(&store), pipeline));
    let proxy = Arc::new(
        ProxyService::new(
            Arc::clone(&store),
            Arc::clone(&origin),
            ProxyConfig::default(),
        )
        .with_failed_url_log(Arc::clone(&log)),
    );

    let router = create_router(
        images,
        proxy,
        Arc::clone(&log),
        RouterConfig::new().with_tracing(false),
    );

    TestApp {
        router,
        store,
        origin,
        log,
        _dir: dir,
    }
}

fn app() -> TestApp {
    app_with(MockOrigin::status(StatusCode::NOT_FOUND))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Process endpoint
// =============================================================================

#[tokio::test]
async fn test_process_endpoint_headers() {
    let app = app();
    app.store
        .insert("movies/poster", png_bytes(400, 600), Some("image/png"));

    let response = app
        .router
        .oneshot(get("/images/movies/poster/200/80/webp"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "image/webp");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=poster.webp"
    );
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "public, max-age=604800, immutable"
    );

    let data = body_bytes(response).await;
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        data.len().to_string().as_str()
    );
    let decoded = image::load_from_memory(&data).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 300));
}

#[tokio::test]
async fn test_process_fractional_quality() {
    let app = app();
    app.store
        .insert("movies/still", jpeg_bytes(64, 64), Some("image/jpeg"));

    let response = app
        .router
        .oneshot(get("/images/movies/still/32/72.5/jpeg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn test_process_errors() {
    let app = app();
    app.store
        .insert("movies/poster", png_bytes(10, 10), Some("image/png"));

    let cases = [
        ("/images/movies/poster/100/80/bmp", StatusCode::BAD_REQUEST, "unknown_format"),
        ("/images/movies/poster/100/101/webp", StatusCode::BAD_REQUEST, "invalid_quality"),
        ("/images/movies/poster/wide/80/webp", StatusCode::BAD_REQUEST, "invalid_parameter"),
        ("/images/movies/missing/100/80/webp", StatusCode::NOT_FOUND, "not_found"),
        ("/images/movies/poster/60000/80/png", StatusCode::BAD_REQUEST, "image_too_large"),
        (
            "/images/movies/poster/100/80/svg",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_format",
        ),
    ];

    for (uri, status, error_type) in cases {
        let response = app.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), status, "{}", uri);

        let json = body_json(response).await;
        assert_eq!(json["error"], error_type, "{}", uri);
        assert_eq!(json["status"], status.as_u16(), "{}", uri);
    }
}

#[tokio::test]
async fn test_process_undecodable_source() {
    let app = app();
    app.store
        .insert("movies/broken", &b"GIF87a but not really"[..], Some("image/gif"));

    let response = app
        .router
        .oneshot(get("/images/movies/broken/100/80/webp"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Proxy endpoint
// =============================================================================

#[tokio::test]
async fn test_proxy_endpoint_serves_and_caches() {
    let poster = jpeg_bytes(60, 90);
    let app = app_with(MockOrigin::image(&poster, "image/jpeg", 512));

    let response = app
        .router
        .clone()
        .oneshot(get("/kinopoisk-images/1946459/abc/orig"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=604800, immutable"
    );
    assert_eq!(response.headers()["x-cache-source"], "origin");
    assert_eq!(body_bytes(response).await.as_ref(), poster.as_slice());

    let key = "proxy/kinopoisk-images/1946459/abc/600x900";
    assert!(wait_for_object(&app.store, key).await);

    let response = app
        .router
        .oneshot(get("/kinopoisk-images/1946459/abc/x1000"))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-cache-source"], "durable-store");
    assert_eq!(body_bytes(response).await.as_ref(), poster.as_slice());
    assert_eq!(app.origin.request_count(), 1);
}

#[tokio::test]
async fn test_proxy_forwards_vendor_status() {
    let app = app_with(MockOrigin::status(StatusCode::SERVICE_UNAVAILABLE));

    let response = app
        .router
        .oneshot(get("/kinopoisk-st-images/film_big/1.jpg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_proxy_unknown_service() {
    let app = app();

    let response = app
        .router
        .oneshot(get("/imdb-images/poster.jpg"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "unknown_service");
    assert_eq!(app.origin.request_count(), 0);
}

#[tokio::test]
async fn test_proxy_unreachable_vendor() {
    let app = app_with(MockOrigin::unreachable());

    let response = app
        .router
        .oneshot(get("/kinopoisk-ott-images/abc/def/300x450"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "vendor_unavailable");
}

// =============================================================================
// Admin endpoints
// =============================================================================

#[tokio::test]
async fn test_failed_urls_missing_log() {
    let app = app();

    let response = app
        .router
        .oneshot(get("/admin/failed-urls"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_urls_download_and_clear() {
    let app = app_with(MockOrigin::status(StatusCode::NOT_FOUND));

    let response = app
        .router
        .clone()
        .oneshot(get("/kinopoisk-st-images/film_big/404.jpg"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(get("/admin/failed-urls"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let text = body_bytes(response).await;
    let text = std::str::from_utf8(&text).unwrap();
    assert!(text.contains("https://st.kp.yandex.net/images/film_big/404.jpg"));

    let request = Request::builder()
        .method("DELETE")
        .uri("/admin/failed-urls")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("cleared"));

    assert_eq!(app.log.read().await.unwrap(), Some(String::new()));
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = app();

    let response = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
