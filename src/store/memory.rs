//! In-process fast cache.
//!
//! Used in place of Redis for single-instance deployments and tests. The
//! cache tracks the total size of stored values in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. Entries also
//! expire after their TTL; expired entries are dropped lazily on access.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::FastCache;
use crate::error::StoreError;

/// Default cache capacity: 64MB
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Maximum number of entries (to bound LRU overhead)
const MAX_ENTRIES: usize = 10_000;

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

struct Inner {
    entries: LruCache<String, Entry>,
    current_size: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.current_size = self.current_size.saturating_sub(entry.value.len());
        Some(entry)
    }
}

/// LRU fast cache with a byte capacity and per-entry TTL.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use movie_image_proxy::store::{FastCache, MemoryFastCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = MemoryFastCache::with_capacity(1024 * 1024);
///
///     let value = Bytes::from_static(b"\x00\x09image/png\x89PNG");
///     cache.set("img:proxy/tmdb-images/a.png", value.clone(), Duration::from_secs(600))
///         .await
///         .unwrap();
///
///     let cached = cache.get("img:proxy/tmdb-images/a.png").await.unwrap();
///     assert_eq!(cached, Some(value));
/// }
/// ```
pub struct MemoryFastCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryFastCache {
    /// Create a cache with the default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of values.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, MAX_ENTRIES)
    }

    /// Create a cache with a byte capacity and an entry limit.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Number of live and not-yet-collected expired entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Total size of stored values in bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryFastCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FastCache for MemoryFastCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.remove(key);

        if ttl.is_zero() || value.len() > self.max_size {
            return Ok(());
        }

        let size = value.len();
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };

        // push() hands back whatever the entry limit displaced
        if let Some((_, displaced)) = inner.entries.push(key.to_string(), entry) {
            inner.current_size = inner.current_size.saturating_sub(displaced.value.len());
        }
        inner.current_size += size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.value.len());
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
