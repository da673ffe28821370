//! Fetch-and-cache orchestration.
//!
//! Every proxy request walks the tiers in a fixed order and stops at the
//! first valid answer:
//!
//! ```text
//!  ┌────────────┐  miss/invalid  ┌───────────────┐  miss/invalid  ┌─────────┐
//!  │ Fast cache ├───────────────►│ Durable store ├───────────────►│ Vendor  │
//!  └─────┬──────┘                └──────┬────────┘                └────┬────┘
//!        │ hit                          │ hit                          │ 200 + valid
//!        ▼                              ▼                              ▼
//!     respond               respond + backfill fast       respond + backfill both
//! ```
//!
//! Invalid entries (HTML error pages, unknown payloads) found in a tier are
//! deleted and never served. A poisoned durable store entry is deleted
//! before the vendor is asked again, and its replacement is always written. Vendor answers that fail
//! validation are passed to the caller but never cached. Nothing negative
//! is cached: a vendor error is retried on the next request.
//!
//! Concurrent misses for the same key are not coalesced; each fetches the
//! vendor and each backfill writes the same bytes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backfill::{
    BackfillTarget, Backfiller, DEFAULT_BACKFILL_TIMEOUT, DEFAULT_FAST_CACHE_TTL,
    DEFAULT_MAX_BACKFILL_BYTES,
};
use super::failed_urls::FailedUrlLog;
use super::origin::Origin;
use super::tee::{tee, DEFAULT_BACKFILL_BUFFER, DEFAULT_CLIENT_BUFFER};
use super::vendor::{CacheKey, VendorService};
use crate::body::{self, BodyStream, Finality};
use crate::error::{OriginError, ProxyError, StoreError};
use crate::format::{classify, sniff_image_signature, Validity, SNIFF_LEN};
use crate::store::{decode_envelope, BlobStore, FastCache};

/// Default deadline for a proxy request, body included.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(300);

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for [`ProxyService`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Forwarding proxy prefix for TMDB requests
    pub tmdb_proxy: String,

    /// Deadline for tier resolution and the response body
    pub timeout: Duration,

    /// TTL of fast-tier entries
    pub fast_cache_ttl: Duration,

    /// Upper bound on one backfill job
    pub backfill_timeout: Duration,

    /// Largest object buffered for backfill
    pub max_backfill_bytes: usize,

    /// Client-side tee buffer, in chunks
    pub client_buffer: usize,

    /// Backfill-side tee buffer, in chunks
    pub backfill_buffer: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            tmdb_proxy: String::new(),
            timeout: DEFAULT_PROXY_TIMEOUT,
            fast_cache_ttl: DEFAULT_FAST_CACHE_TTL,
            backfill_timeout: DEFAULT_BACKFILL_TIMEOUT,
            max_backfill_bytes: DEFAULT_MAX_BACKFILL_BYTES,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            backfill_buffer: DEFAULT_BACKFILL_BUFFER,
        }
    }
}

// =============================================================================
// Proxy Response
// =============================================================================

/// The tier that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    FastCache,
    DurableStore,
    Origin,
}

impl Tier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::FastCache => "fast-cache",
            Tier::DurableStore => "durable-store",
            Tier::Origin => "origin",
        }
    }
}

/// The answer to a proxy request. The body can be read once.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: BodyStream,
    pub source: Tier,
    pub finality: Finality,
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("source", &self.source)
            .field("finality", &self.finality)
            .finish_non_exhaustive()
    }
}

/// Content type to serve: the declared one if it passed the allowlist,
/// otherwise the sniffed one.
fn served_content_type(declared: Option<String>, validity: Validity, head: &[u8]) -> String {
    match (validity, declared) {
        (Validity::Image, Some(declared)) => declared,
        (_, declared) => sniff_image_signature(head)
            .map(str::to_string)
            .or(declared)
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
    }
}

/// Outcome of the durable store lookup.
enum StoreLookup {
    Hit(ProxyResponse),
    Miss,
    /// An invalid entry was found and deleted
    Poisoned,
}

// =============================================================================
// Proxy Service
// =============================================================================

/// Resolves vendor assets through the cache tiers.
///
/// # Type Parameters
///
/// * `B` - The durable store
/// * `O` - The vendor origin client
pub struct ProxyService<B: BlobStore, O: Origin> {
    store: Arc<B>,
    origin: Arc<O>,
    fast: Option<Arc<dyn FastCache>>,
    failed_urls: Option<Arc<FailedUrlLog>>,
    backfiller: Backfiller<B>,
    config: ProxyConfig,
}

impl<B: BlobStore, O: Origin> ProxyService<B, O> {
    /// Create a service without a fast tier or failure log.
    pub fn new(store: Arc<B>, origin: Arc<O>, config: ProxyConfig) -> Self {
        let backfiller = Self::backfiller_for(&store, None, &config);
        Self {
            store,
            origin,
            fast: None,
            failed_urls: None,
            backfiller,
            config,
        }
    }

    /// Put a fast tier in front of the durable store.
    pub fn with_fast_cache(mut self, fast: Arc<dyn FastCache>) -> Self {
        self.backfiller = Self::backfiller_for(&self.store, Some(Arc::clone(&fast)), &self.config);
        self.fast = Some(fast);
        self
    }

    /// Record vendor failures to `log`.
    pub fn with_failed_url_log(mut self, log: Arc<FailedUrlLog>) -> Self {
        self.failed_urls = Some(log);
        self
    }

    fn backfiller_for(
        store: &Arc<B>,
        fast: Option<Arc<dyn FastCache>>,
        config: &ProxyConfig,
    ) -> Backfiller<B> {
        Backfiller::new(
            Arc::clone(store),
            fast,
            config.fast_cache_ttl,
            config.max_backfill_bytes,
            config.backfill_timeout,
        )
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn has_fast_cache(&self) -> bool {
        self.fast.is_some()
    }

    /// Resolve `raw_path` for `service`.
    ///
    /// A vendor non-200 is not an error: it comes back as a response with
    /// that status, an empty body and [`Finality::Retryable`].
    ///
    /// # Errors
    ///
    /// - `VendorUnavailable` if the vendor cannot be reached
    /// - `Store` for durable store failures other than not-found
    /// - `Timeout` if resolution does not finish before the deadline; a
    ///   body still streaming at the deadline ends with an I/O error
    pub async fn proxy(
        &self,
        service: VendorService,
        raw_path: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        let key = CacheKey::new(service, raw_path);
        let deadline = Instant::now() + self.config.timeout;

        let mut response = tokio::time::timeout_at(deadline, self.resolve(&key))
            .await
            .map_err(|_| ProxyError::Timeout {
                seconds: self.config.timeout.as_secs(),
            })??;

        debug!(
            key = %key,
            source = response.source.as_str(),
            status = response.status.as_u16(),
            "Proxy request resolved"
        );

        response.body = body::with_deadline(response.body, deadline);
        Ok(response)
    }

    async fn resolve(&self, key: &CacheKey) -> Result<ProxyResponse, ProxyError> {
        if let Some(fast) = &self.fast {
            if let Some(response) = self.check_fast_cache(fast.as_ref(), key).await {
                return Ok(response);
            }
        }

        let target = match self.check_store(key).await? {
            StoreLookup::Hit(response) => return Ok(response),
            StoreLookup::Miss => BackfillTarget::StoreAndFast,
            StoreLookup::Poisoned => BackfillTarget::Replace,
        };

        self.fetch_origin(key, target).await
    }

    // -------------------------------------------------------------------------
    // Tiers
    // -------------------------------------------------------------------------

    /// Any failure here is a miss.
    async fn check_fast_cache(&self, fast: &dyn FastCache, key: &CacheKey) -> Option<ProxyResponse> {
        let fast_key = key.fast_key();

        let raw = match fast.get(&fast_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %fast_key, error = %e, "Fast cache lookup failed, treating as miss");
                return None;
            }
        };

        let envelope = match decode_envelope(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %fast_key, error = %e, "Dropping malformed fast cache entry");
                Self::delete_fast_entry(fast, &fast_key).await;
                return None;
            }
        };

        let validity = classify(Some(envelope.content_type.as_str()), &envelope.data);
        if !validity.is_valid() {
            warn!(key = %fast_key, validity = ?validity, "Dropping invalid fast cache entry");
            Self::delete_fast_entry(fast, &fast_key).await;
            return None;
        }

        let content_type = served_content_type(
            Some(envelope.content_type),
            validity,
            &envelope.data,
        );

        Some(ProxyResponse {
            status: StatusCode::OK,
            content_type: Some(content_type),
            content_length: Some(envelope.data.len() as u64),
            body: body::once(envelope.data),
            source: Tier::FastCache,
            finality: Finality::Immutable,
        })
    }

    async fn check_store(&self, key: &CacheKey) -> Result<StoreLookup, ProxyError> {
        let object = match self.store.get(key.as_str()).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "Durable store miss");
                return Ok(StoreLookup::Miss);
            }
            Err(e) => return Err(e.into()),
        };

        let peeked = body::peek(object.body, SNIFF_LEN)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", key, e)))?;

        let validity = classify(object.content_type.as_deref(), &peeked.head);
        if !validity.is_valid() {
            warn!(
                key = %key,
                content_type = ?object.content_type,
                validity = ?validity,
                "Poisoned durable store entry, deleting and refetching"
            );
            // Finishes before the refetch, so it cannot remove the replacement
            match self.store.delete(key.as_str()).await {
                Ok(()) => info!(key = %key, "Deleted poisoned entry"),
                Err(e) => warn!(key = %key, error = %e, "Failed to delete poisoned entry"),
            }
            return Ok(StoreLookup::Poisoned);
        }

        let content_type = served_content_type(object.content_type, validity, &peeked.head);

        let body = if self.fast.is_some() {
            let (client, feed) = tee(
                peeked.body,
                self.config.client_buffer,
                self.config.backfill_buffer,
                key.to_string(),
            );
            self.backfiller
                .spawn(feed, key.clone(), content_type.clone(), BackfillTarget::FastOnly);
            client
        } else {
            peeked.body
        };

        Ok(StoreLookup::Hit(ProxyResponse {
            status: StatusCode::OK,
            content_type: Some(content_type),
            content_length: object.content_length,
            body,
            source: Tier::DurableStore,
            finality: Finality::Immutable,
        }))
    }

    /// `target` decides how the durable store is written if the vendor
    /// answers with a valid image.
    async fn fetch_origin(
        &self,
        key: &CacheKey,
        target: BackfillTarget,
    ) -> Result<ProxyResponse, ProxyError> {
        let url = key.upstream_url(&self.config.tmdb_proxy);
        debug!(key = %key, url = %url, "Fetching from vendor");

        let response = match self.origin.fetch(&url).await {
            Ok(response) => response,
            Err(source) => {
                warn!(url = %url, error = %source, "Vendor unreachable");
                self.record_failure(&url, &source.to_string()).await;
                return Err(ProxyError::VendorUnavailable { url, source });
            }
        };

        if response.status != StatusCode::OK {
            warn!(url = %url, status = response.status.as_u16(), "Vendor returned non-200");
            self.record_failure(&url, response.status.as_str()).await;
            return Ok(ProxyResponse {
                status: response.status,
                content_type: None,
                content_length: Some(0),
                body: body::empty(),
                source: Tier::Origin,
                finality: Finality::Retryable,
            });
        }

        let peeked = match body::peek(response.body, SNIFF_LEN).await {
            Ok(peeked) => peeked,
            Err(e) => {
                let source = if e.kind() == std::io::ErrorKind::TimedOut {
                    OriginError::Timeout(e.to_string())
                } else {
                    OriginError::Connection(e.to_string())
                };
                self.record_failure(&url, &source.to_string()).await;
                return Err(ProxyError::VendorUnavailable { url, source });
            }
        };

        let validity = classify(response.content_type.as_deref(), &peeked.head);
        if !validity.is_valid() {
            warn!(
                url = %url,
                content_type = ?response.content_type,
                validity = ?validity,
                "Vendor answered with a non-image, passing through uncached"
            );
            return Ok(ProxyResponse {
                status: StatusCode::OK,
                content_type: response.content_type,
                content_length: response.content_length,
                body: peeked.body,
                source: Tier::Origin,
                finality: Finality::Retryable,
            });
        }

        let content_type = served_content_type(response.content_type, validity, &peeked.head);

        let (client, feed) = tee(
            peeked.body,
            self.config.client_buffer,
            self.config.backfill_buffer,
            key.to_string(),
        );
        self.backfiller
            .spawn(feed, key.clone(), content_type.clone(), target);

        info!(key = %key, url = %url, "Serving from vendor");

        Ok(ProxyResponse {
            status: StatusCode::OK,
            content_type: Some(content_type),
            content_length: response.content_length,
            body: client,
            source: Tier::Origin,
            finality: Finality::Immutable,
        })
    }

    // -------------------------------------------------------------------------
    // Side effects
    // -------------------------------------------------------------------------

    /// Awaited so a later backfill of the same key cannot be undone.
    async fn delete_fast_entry(fast: &dyn FastCache, key: &str) {
        if let Err(e) = fast.delete(key).await {
            warn!(key = %key, error = %e, "Failed to delete fast cache entry");
        }
    }

    async fn record_failure(&self, url: &str, reason: &str) {
        if let Some(log) = &self.failed_urls {
            if let Err(e) = log.record(url, reason).await {
                warn!(path = %log.path().display(), error = %e, "Failed to record vendor failure");
            }
        }
    }
}
