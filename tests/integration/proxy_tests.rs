//! Proxy path: fast cache -> durable store -> vendor, with write-back.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

use movie_image_proxy::error::{OriginError, ProxyError};
use movie_image_proxy::proxy::{
    CacheKey, FailedUrlLog, ProxyConfig, ProxyService, Tier, VendorService,
};
use movie_image_proxy::store::{
    decode_envelope, encode_envelope, Envelope, FastCache, MemoryFastCache,
};
use movie_image_proxy::Finality;

use super::test_utils::{
    jpeg_bytes, read_body, wait_for_object, wait_until, MemoryBlobStore, MockOrigin, MockReply,
    HTML_ERROR_PAGE,
};

const TMDB_PROXY: &str = "https://tmdb-proxy.example.com/fetch";

fn config() -> ProxyConfig {
    ProxyConfig {
        tmdb_proxy: TMDB_PROXY.to_string(),
        ..ProxyConfig::default()
    }
}

/// Poll the fast tier until `key` holds an entry of `content_type`.
async fn wait_for_fast_entry(
    fast: &MemoryFastCache,
    key: &str,
    content_type: &str,
) -> Option<Envelope> {
    for _ in 0..200 {
        if let Ok(Some(raw)) = fast.get(key).await {
            if let Ok(envelope) = decode_envelope(&raw) {
                if envelope.content_type == content_type {
                    return Some(envelope);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

fn proxy_with(
    store: &Arc<MemoryBlobStore>,
    origin: &Arc<MockOrigin>,
) -> ProxyService<MemoryBlobStore, MockOrigin> {
    ProxyService::new(Arc::clone(store), Arc::clone(origin), config())
}

// =============================================================================
// Vendor fetch and backfill
// =============================================================================

#[tokio::test]
async fn test_unseen_tmdb_path_is_fetched_once_and_stored() {
    let poster = jpeg_bytes(60, 90);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::TmdbImages, "w500/abc.jpg")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.source, Tier::Origin);
    assert_eq!(response.finality, Finality::Immutable);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());

    assert_eq!(origin.request_count(), 1);
    assert_eq!(
        origin.requests()[0],
        "https://tmdb-proxy.example.com/fetch?url=https://www.themoviedb.org/t/p/w500/abc.jpg"
    );

    let key = "proxy/tmdb-images/w500/abc.jpg";
    assert!(wait_for_object(&store, key).await);
    assert_eq!(store.object(key).unwrap().as_ref(), poster.as_slice());
    assert_eq!(store.content_type(key).as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_second_request_is_served_from_store() {
    let poster = jpeg_bytes(60, 90);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let first = proxy
        .proxy(VendorService::TmdbImages, "w500/abc.jpg")
        .await
        .unwrap();
    read_body(first.body).await;
    assert!(wait_for_object(&store, "proxy/tmdb-images/w500/abc.jpg").await);

    let second = proxy
        .proxy(VendorService::TmdbImages, "w500/abc.jpg")
        .await
        .unwrap();

    assert_eq!(second.source, Tier::DurableStore);
    assert_eq!(second.content_length, Some(poster.len() as u64));
    assert_eq!(read_body(second.body).await.as_ref(), poster.as_slice());
    assert_eq!(origin.request_count(), 1);
}

#[tokio::test]
async fn test_vendor_error_is_forwarded_and_never_cached() {
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::status(StatusCode::SERVICE_UNAVAILABLE));
    let proxy = proxy_with(&store, &origin);

    for attempt in 1..=2 {
        let response = proxy
            .proxy(VendorService::KinopoiskStImages, "film_big/1.jpg")
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.finality, Finality::Retryable);
        assert_eq!(response.content_length, Some(0));
        assert!(read_body(response.body).await.is_empty());
        assert_eq!(origin.request_count(), attempt);
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.put_count(), 0);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_vendor_recovers_after_error() {
    let poster = jpeg_bytes(20, 30);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::status(StatusCode::BAD_GATEWAY));
    let proxy = proxy_with(&store, &origin);

    let failed = proxy
        .proxy(VendorService::KinopoiskImages, "1234/abcd/300x450")
        .await
        .unwrap();
    assert_eq!(failed.status, StatusCode::BAD_GATEWAY);

    origin.set_reply(MockReply::Respond {
        status: StatusCode::OK,
        content_type: Some("image/jpeg".to_string()),
        chunks: vec![Bytes::from(poster.clone())],
    });

    let recovered = proxy
        .proxy(VendorService::KinopoiskImages, "1234/abcd/300x450")
        .await
        .unwrap();
    assert_eq!(recovered.status, StatusCode::OK);
    assert_eq!(read_body(recovered.body).await.as_ref(), poster.as_slice());
    assert_eq!(origin.request_count(), 2);
}

#[tokio::test]
async fn test_unreachable_vendor() {
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::unreachable());
    let proxy = proxy_with(&store, &origin);

    let err = proxy
        .proxy(VendorService::KinopoiskOttImages, "abc/def/orig")
        .await
        .unwrap_err();

    match err {
        ProxyError::VendorUnavailable { url, source } => {
            assert_eq!(url, "https://avatars.mds.yandex.net/get-ott/abc/def/600x900");
            assert!(matches!(source, OriginError::Connection(_)));
        }
        other => panic!("Expected VendorUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_html_from_vendor_is_passed_through_uncached() {
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(HTML_ERROR_PAGE, "text/html", 16));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/2.jpg")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.finality, Finality::Retryable);
    assert_eq!(read_body(response.body).await.as_ref(), HTML_ERROR_PAGE);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_untyped_vendor_image_is_sniffed() {
    let poster = jpeg_bytes(20, 30);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "application/octet-stream", 64));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/3.jpg")
        .await
        .unwrap();

    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    read_body(response.body).await;

    let key = "proxy/kinopoisk-st-images/film_big/3.jpg";
    assert!(wait_for_object(&store, key).await);
    assert_eq!(store.content_type(key).as_deref(), Some("image/jpeg"));
}

// =============================================================================
// Key normalization
// =============================================================================

#[tokio::test]
async fn test_kinopoisk_oversize_tokens_share_one_object() {
    let poster = jpeg_bytes(60, 90);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let first = proxy
        .proxy(VendorService::KinopoiskImages, "1946459/abc/x1000")
        .await
        .unwrap();
    read_body(first.body).await;

    let key = "proxy/kinopoisk-images/1946459/abc/600x900";
    assert!(wait_for_object(&store, key).await);

    for path in ["1946459/abc/orig", "1946459/abc/600x900"] {
        let response = proxy
            .proxy(VendorService::KinopoiskImages, path)
            .await
            .unwrap();
        assert_eq!(response.source, Tier::DurableStore, "path {}", path);
        read_body(response.body).await;
    }

    assert_eq!(origin.request_count(), 1);
    assert_eq!(
        origin.requests()[0],
        "https://avatars.mds.yandex.net/get-kinopoisk-image/1946459/abc/600x900"
    );
    assert_eq!(store.len(), 1);
}

// =============================================================================
// Poisoned entries
// =============================================================================

#[tokio::test]
async fn test_poisoned_store_entry_is_refetched_and_replaced() {
    let poster = jpeg_bytes(60, 90);
    let key = "proxy/kinopoisk-st-images/film_big/4.jpg";

    let store = Arc::new(MemoryBlobStore::new());
    store.insert(key, HTML_ERROR_PAGE, Some("text/html; charset=utf-8"));
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/4.jpg")
        .await
        .unwrap();

    assert_eq!(response.source, Tier::Origin);
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());
    assert_eq!(origin.request_count(), 1);

    assert!(wait_until(|| store.delete_count() >= 1).await);
    assert!(
        wait_until(|| store.object(key).map(|o| o.as_ref() == poster.as_slice()) == Some(true))
            .await
    );
}

#[tokio::test]
async fn test_slow_poison_delete_cannot_remove_the_replacement() {
    let poster = jpeg_bytes(60, 90);
    let key = "proxy/kinopoisk-st-images/film_big/6.jpg";

    let store = Arc::new(MemoryBlobStore::new().with_delete_delay(Duration::from_millis(200)));
    store.insert(key, HTML_ERROR_PAGE, Some("text/html"));
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/6.jpg")
        .await
        .unwrap();
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());

    // The delete completed before the vendor was asked
    assert_eq!(store.delete_count(), 1);
    assert!(
        wait_until(|| store.object(key).map(|o| o.as_ref() == poster.as_slice()) == Some(true))
            .await
    );

    // Past the point where a detached delete would have landed
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.object(key).as_deref(), Some(poster.as_slice()));
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn test_poisoned_entry_is_overwritten_when_delete_fails() {
    let key = "proxy/kinopoisk-st-images/film_big/7.jpg";
    let poster = jpeg_bytes(60, 90);
    // Same length as the replacement, and labeled as the same type
    let mut poisoned = b"<html>".to_vec();
    poisoned.resize(poster.len(), b' ');

    let store = Arc::new(MemoryBlobStore::new().with_failing_deletes());
    store.insert(key, poisoned, Some("image/jpeg"));
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 1000));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/7.jpg")
        .await
        .unwrap();
    assert_eq!(response.source, Tier::Origin);
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());

    assert!(
        wait_until(|| store.object(key).map(|o| o.as_ref() == poster.as_slice()) == Some(true))
            .await
    );
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn test_html_body_with_image_type_is_poisoned() {
    let key = "proxy/tmdb-images/w92/x.jpg";
    let store = Arc::new(MemoryBlobStore::new());
    store.insert(key, &b"<html><body>blocked</body></html>"[..], Some("image/jpeg"));
    let origin = Arc::new(MockOrigin::status(StatusCode::NOT_FOUND));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::TmdbImages, "w92/x.jpg")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(origin.request_count(), 1);
    assert!(wait_until(|| !store.contains(key)).await);
}

// =============================================================================
// Fast tier
// =============================================================================

#[tokio::test]
async fn test_store_hit_fills_fast_tier_then_serves_from_it() {
    let poster = jpeg_bytes(60, 90);
    let key = CacheKey::new(VendorService::KinopoiskStImages, "film_big/5.jpg");

    let store = Arc::new(MemoryBlobStore::new());
    store.insert(key.as_str(), poster.clone(), Some("image/jpeg"));
    let origin = Arc::new(MockOrigin::unreachable());
    let fast = Arc::new(MemoryFastCache::new());
    let proxy = proxy_with(&store, &origin).with_fast_cache(fast.clone());

    let first = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/5.jpg")
        .await
        .unwrap();
    assert_eq!(first.source, Tier::DurableStore);
    read_body(first.body).await;

    let envelope = wait_for_fast_entry(&fast, &key.fast_key(), "image/jpeg")
        .await
        .expect("fast tier was not filled");
    assert_eq!(envelope.data.as_ref(), poster.as_slice());

    let gets_before = store.get_count();
    let second = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/5.jpg")
        .await
        .unwrap();
    assert_eq!(second.source, Tier::FastCache);
    assert_eq!(second.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(read_body(second.body).await.as_ref(), poster.as_slice());
    assert_eq!(store.get_count(), gets_before);
    assert_eq!(origin.request_count(), 0);
}

#[tokio::test]
async fn test_vendor_fetch_fills_both_tiers() {
    let poster = jpeg_bytes(30, 45);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 256));
    let fast = Arc::new(MemoryFastCache::new());
    let proxy = proxy_with(&store, &origin).with_fast_cache(fast.clone());

    let response = proxy
        .proxy(VendorService::TmdbImages, "w185/y.jpg")
        .await
        .unwrap();
    read_body(response.body).await;

    let key = CacheKey::new(VendorService::TmdbImages, "w185/y.jpg");
    assert!(wait_for_object(&store, key.as_str()).await);
    let envelope = wait_for_fast_entry(&fast, &key.fast_key(), "image/jpeg").await;
    assert_eq!(envelope.unwrap().data.as_ref(), poster.as_slice());
}

#[tokio::test]
async fn test_invalid_fast_entry_is_dropped() {
    let poster = jpeg_bytes(30, 45);
    let key = CacheKey::new(VendorService::KinopoiskStImages, "film_big/6.jpg");

    let store = Arc::new(MemoryBlobStore::new());
    store.insert(key.as_str(), poster.clone(), Some("image/jpeg"));
    let origin = Arc::new(MockOrigin::unreachable());
    let fast = Arc::new(MemoryFastCache::new());
    let poisoned = encode_envelope("text/html", HTML_ERROR_PAGE).unwrap();
    fast.set(&key.fast_key(), poisoned, Duration::from_secs(60))
        .await
        .unwrap();

    let proxy = proxy_with(&store, &origin).with_fast_cache(fast.clone());
    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/6.jpg")
        .await
        .unwrap();

    assert_eq!(response.source, Tier::DurableStore);
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());

    // Replaced by the store-hit backfill
    let envelope = wait_for_fast_entry(&fast, &key.fast_key(), "image/jpeg").await;
    assert_eq!(envelope.unwrap().data.as_ref(), poster.as_slice());
}

#[tokio::test]
async fn test_malformed_fast_entry_is_a_miss() {
    let poster = jpeg_bytes(30, 45);
    let key = CacheKey::new(VendorService::KinopoiskStImages, "film_big/7.jpg");

    let store = Arc::new(MemoryBlobStore::new());
    store.insert(key.as_str(), poster.clone(), Some("image/jpeg"));
    let origin = Arc::new(MockOrigin::unreachable());
    let fast = Arc::new(MemoryFastCache::new());
    fast.set(&key.fast_key(), Bytes::from_static(&[0xFF]), Duration::from_secs(60))
        .await
        .unwrap();

    let proxy = proxy_with(&store, &origin).with_fast_cache(fast);
    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/7.jpg")
        .await
        .unwrap();

    assert_eq!(response.source, Tier::DurableStore);
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_misses_may_each_fetch() {
    let poster = jpeg_bytes(60, 90);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(
        MockOrigin::image(&poster, "image/jpeg", 512).with_delay(Duration::from_millis(50)),
    );
    let proxy = Arc::new(proxy_with(&store, &origin));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let proxy = Arc::clone(&proxy);
        handles.push(tokio::spawn(async move {
            let response = proxy
                .proxy(VendorService::TmdbImages, "original/z.jpg")
                .await
                .unwrap();
            read_body(response.body).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().as_ref(), poster.as_slice());
    }

    // No coalescing: every miss reached the vendor, and the store ends up
    // with one copy of the same bytes
    assert_eq!(origin.request_count(), 4);
    let key = "proxy/tmdb-images/original/z.jpg";
    assert!(wait_for_object(&store, key).await);
    assert_eq!(store.len(), 1);
    assert_eq!(store.object(key).unwrap().as_ref(), poster.as_slice());
}

#[tokio::test]
async fn test_client_disconnect_does_not_cancel_backfill() {
    let poster = jpeg_bytes(120, 180);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 128));
    let proxy = proxy_with(&store, &origin);

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/8.jpg")
        .await
        .unwrap();
    drop(response);

    let key = "proxy/kinopoisk-st-images/film_big/8.jpg";
    assert!(wait_for_object(&store, key).await);
    assert_eq!(store.object(key).unwrap().as_ref(), poster.as_slice());
}

#[tokio::test]
async fn test_oversized_object_is_served_but_not_stored() {
    let poster = jpeg_bytes(120, 180);
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::image(&poster, "image/jpeg", 128));
    let proxy = ProxyService::new(
        Arc::clone(&store),
        Arc::clone(&origin),
        ProxyConfig {
            max_backfill_bytes: 256,
            ..config()
        },
    );

    let response = proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/9.jpg")
        .await
        .unwrap();
    assert_eq!(read_body(response.body).await.as_ref(), poster.as_slice());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.put_count(), 0);
}

// =============================================================================
// Failed URL log
// =============================================================================

#[tokio::test]
async fn test_vendor_failures_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FailedUrlLog::new(dir.path().join("failed_urls.txt")));

    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(MockOrigin::status(StatusCode::NOT_FOUND));
    let proxy = proxy_with(&store, &origin).with_failed_url_log(Arc::clone(&log));

    proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/10.jpg")
        .await
        .unwrap();

    origin.set_reply(MockReply::Unreachable);
    proxy
        .proxy(VendorService::KinopoiskStImages, "film_big/11.jpg")
        .await
        .unwrap_err();

    let contents = log.read().await.unwrap().unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\t404\thttps://st.kp.yandex.net/images/film_big/10.jpg"));
    assert!(lines[1].ends_with("https://st.kp.yandex.net/images/film_big/11.jpg"));
    assert!(lines[1].contains("connection refused"));
}

#[tokio::test]
async fn test_proxy_deadline() {
    let store = Arc::new(MemoryBlobStore::new());
    let origin = Arc::new(
        MockOrigin::image(&jpeg_bytes(8, 8), "image/jpeg", 64)
            .with_delay(Duration::from_millis(500)),
    );
    let proxy = ProxyService::new(
        Arc::clone(&store),
        Arc::clone(&origin),
        ProxyConfig {
            timeout: Duration::from_millis(50),
            ..config()
        },
    );

    let err = proxy
        .proxy(VendorService::TmdbImages, "w92/slow.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Timeout { .. }));
}
