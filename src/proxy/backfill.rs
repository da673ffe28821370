//! Asynchronous write-back into the cache tiers that missed.
//!
//! A backfill consumes a [`Feed`] from the tee, buffers the complete
//! object, and writes it to the durable store and/or the fast tier. It runs
//! detached from the request: a client disconnect does not cancel it, but
//! the whole job is bounded by a timeout and a byte cap.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::tee::Feed;
use super::vendor::CacheKey;
use crate::store::{encode_envelope, BlobMetadata, BlobStore, FastCache};

/// Default upper bound on a single backfill job.
pub const DEFAULT_BACKFILL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default largest object buffered for backfill: 20MB
pub const DEFAULT_MAX_BACKFILL_BYTES: usize = 20 * 1024 * 1024;

/// Default fast-tier TTL.
pub const DEFAULT_FAST_CACHE_TTL: Duration = Duration::from_secs(600);

/// Which tiers a backfill writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillTarget {
    /// Durable store, then the fast tier if configured
    StoreAndFast,

    /// Like `StoreAndFast`, but always overwrites the stored object; used
    /// after a poisoned entry was removed
    Replace,

    /// Only the fast tier (the object came from the durable store)
    FastOnly,
}

/// How a backfill job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// The object was written to every requested tier
    Stored { bytes: usize },

    /// An identical object was already in the durable store
    AlreadyPresent,

    /// Not written: stalled, truncated, too large or timed out
    Abandoned { reason: String },

    /// A write failed
    Failed { reason: String },
}

/// Spawns backfill jobs.
pub struct Backfiller<B: BlobStore> {
    store: Arc<B>,
    fast: Option<Arc<dyn FastCache>>,
    fast_ttl: Duration,
    max_bytes: usize,
    timeout: Duration,
}

impl<B: BlobStore> Clone for Backfiller<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fast: self.fast.clone(),
            fast_ttl: self.fast_ttl,
            max_bytes: self.max_bytes,
            timeout: self.timeout,
        }
    }
}

impl<B: BlobStore> Backfiller<B> {
    pub fn new(
        store: Arc<B>,
        fast: Option<Arc<dyn FastCache>>,
        fast_ttl: Duration,
        max_bytes: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            fast,
            fast_ttl,
            max_bytes,
            timeout,
        }
    }

    /// Consume `feed` on a detached task and write the result back.
    ///
    /// The handle is only for callers that want to wait; dropping it does
    /// not cancel the job.
    pub fn spawn(
        &self,
        feed: mpsc::Receiver<Feed>,
        key: CacheKey,
        content_type: String,
        target: BackfillTarget,
    ) -> JoinHandle<BackfillOutcome> {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(
                this.timeout,
                this.run(feed, &key, &content_type, target),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => BackfillOutcome::Abandoned {
                    reason: format!("timed out after {}s", this.timeout.as_secs()),
                },
            };

            match &outcome {
                BackfillOutcome::Stored { bytes } => {
                    info!(key = %key, bytes = bytes, target = ?target, "Backfilled")
                }
                BackfillOutcome::AlreadyPresent => {
                    debug!(key = %key, "Backfill skipped, object already stored")
                }
                BackfillOutcome::Abandoned { reason } => {
                    warn!(key = %key, reason = %reason, "Backfill abandoned")
                }
                BackfillOutcome::Failed { reason } => {
                    warn!(key = %key, reason = %reason, "Backfill failed")
                }
            }

            outcome
        })
    }

    async fn run(
        &self,
        feed: mpsc::Receiver<Feed>,
        key: &CacheKey,
        content_type: &str,
        target: BackfillTarget,
    ) -> BackfillOutcome {
        let data = match collect_feed(feed, self.max_bytes).await {
            Ok(data) => data,
            Err(reason) => return BackfillOutcome::Abandoned { reason },
        };

        let mut already_present = false;
        if target == BackfillTarget::StoreAndFast {
            match self.store.head(key.as_str()).await {
                Ok(Some(meta)) => {
                    already_present = is_same_object(&meta, data.len(), content_type);
                }
                // A failed head is not fatal; the put decides
                Ok(None) | Err(_) => {}
            }
        }

        if target != BackfillTarget::FastOnly && !already_present {
            if let Err(e) = self.store.put(key.as_str(), data.clone(), content_type).await {
                return BackfillOutcome::Failed {
                    reason: format!("durable store: {}", e),
                };
            }
        }

        if let Some(fast) = &self.fast {
            let written = match encode_envelope(content_type, &data) {
                Ok(value) => fast.set(&key.fast_key(), value, self.fast_ttl).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                return BackfillOutcome::Failed {
                    reason: format!("fast cache: {}", e),
                };
            }
        }

        if already_present && self.fast.is_none() {
            BackfillOutcome::AlreadyPresent
        } else {
            BackfillOutcome::Stored { bytes: data.len() }
        }
    }
}

/// A stored object matches when both its length and content type do.
fn is_same_object(meta: &BlobMetadata, len: usize, content_type: &str) -> bool {
    meta.content_length == len as u64
        && meta
            .content_type
            .as_deref()
            .is_some_and(|stored| stored.eq_ignore_ascii_case(content_type))
}

/// Buffer a feed until [`Feed::End`].
///
/// Errors with a reason when the feed closes early or exceeds `max_bytes`.
/// Returning early drops the receiver, which tells the pump to stop feeding.
async fn collect_feed(mut feed: mpsc::Receiver<Feed>, max_bytes: usize) -> Result<Bytes, String> {
    let mut buf = BytesMut::new();

    while let Some(message) = feed.recv().await {
        match message {
            Feed::Chunk(chunk) => {
                if buf.len() + chunk.len() > max_bytes {
                    return Err(format!("object exceeds {} byte backfill limit", max_bytes));
                }
                buf.extend_from_slice(&chunk);
            }
            Feed::End => return Ok(buf.freeze()),
        }
    }

    Err("source ended before completion".to_string())
}
