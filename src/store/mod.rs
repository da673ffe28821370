//! Storage tiers.
//!
//! Two contracts, each with a production backend:
//!
//! - [`BlobStore`]: the durable object store. Holds application uploads
//!   under `{entity}/{file}` and proxied vendor assets under
//!   `proxy/{service}/{path}`. Backed by S3 ([`S3BlobStore`]).
//! - [`FastCache`]: an optional low-latency tier in front of the durable
//!   store for proxied assets. Values are [`envelope`]-encoded. Backed by
//!   Redis ([`RedisFastCache`]) or an in-process LRU ([`MemoryFastCache`]).
//!
//! Both traits are object-safe through `async_trait`, so tests can swap in
//! in-memory implementations.

pub mod envelope;
mod memory;
mod redis_cache;
mod s3;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::body::BodyStream;
use crate::error::StoreError;

pub use envelope::{decode_envelope, encode_envelope, Envelope};
pub use memory::{MemoryFastCache, DEFAULT_MEMORY_CACHE_CAPACITY};
pub use redis_cache::RedisFastCache;
pub use s3::{create_s3_client, S3BlobStore};

// =============================================================================
// Blob Store
// =============================================================================

/// An object read from the durable store.
pub struct BlobObject {
    /// Declared `Content-Type`, if the store recorded one
    pub content_type: Option<String>,

    /// Object size in bytes, if known
    pub content_length: Option<u64>,

    /// The object's bytes
    pub body: BodyStream,
}

impl fmt::Debug for BlobObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Object metadata without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub content_type: Option<String>,
    pub content_length: u64,
}

/// Durable key/value object storage.
///
/// Keys are opaque `/`-delimited strings. Objects are immutable: a
/// correction is a delete followed by a new put.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Fetch an object.
    ///
    /// Returns [`StoreError::NotFound`] when the key does not exist. Every
    /// other error is a real failure, not a miss.
    async fn get(&self, key: &str) -> Result<BlobObject, StoreError>;

    /// Fetch an object's metadata, `None` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<BlobMetadata>, StoreError>;

    /// Store an object, replacing any existing one under the key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// Fast Cache
// =============================================================================

/// Low-latency key/value cache with per-entry TTL.
///
/// Entries may vanish at any time; a missing entry is `Ok(None)`.
#[async_trait]
pub trait FastCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
