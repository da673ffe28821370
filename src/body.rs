//! One-shot response bodies.
//!
//! Every tier hands back its payload as a [`BodyStream`]: a boxed,
//! single-pass stream of byte chunks. Nothing in the request path holds a
//! whole object in memory unless it has to (decoding, fast-tier hits).

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::time::Instant;

/// A single-pass stream of body chunks.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

// =============================================================================
// Finality
// =============================================================================

/// Whether a response may be cached downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// A validated asset that never changes under its URL
    Immutable,

    /// A negative or unvalidated answer; the caller should ask again next time
    Retryable,
}

impl Finality {
    pub const fn is_immutable(&self) -> bool {
        matches!(self, Finality::Immutable)
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// A body yielding `data` as a single chunk.
pub fn once(data: Bytes) -> BodyStream {
    stream::once(async move { Ok(data) }).boxed()
}

/// A body with no chunks.
pub fn empty() -> BodyStream {
    stream::empty().boxed()
}

/// A body yielding the given chunks in order.
pub fn from_chunks(chunks: Vec<Bytes>) -> BodyStream {
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

// =============================================================================
// Consumers
// =============================================================================

/// Read the whole body into one buffer.
pub async fn collect(mut body: BodyStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// A body whose first bytes have been read ahead.
pub struct Peeked {
    /// At least `len` bytes, unless the body was shorter
    pub head: Bytes,

    /// The complete body, including the bytes in `head`
    pub body: BodyStream,
}

impl fmt::Debug for Peeked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peeked")
            .field("head_len", &self.head.len())
            .finish_non_exhaustive()
    }
}

/// Read chunks until at least `len` bytes are buffered or the body ends.
///
/// The returned body replays the buffered chunks before continuing with
/// the rest of the source, so the caller can still stream it from the start.
pub async fn peek(mut body: BodyStream, len: usize) -> io::Result<Peeked> {
    let mut chunks = Vec::new();
    let mut buffered = 0;

    while buffered < len {
        match body.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                buffered += chunk.len();
                chunks.push(chunk);
            }
            None => break,
        }
    }

    let head = match chunks.as_slice() {
        [] => Bytes::new(),
        [single] => single.clone(),
        many => {
            let mut buf = BytesMut::with_capacity(buffered);
            for chunk in many {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        }
    };

    let replay = stream::iter(chunks.into_iter().map(Ok));
    Ok(Peeked {
        head,
        body: replay.chain(body).boxed(),
    })
}

/// End the body with a `TimedOut` error if it is still running at `deadline`.
pub fn with_deadline(body: BodyStream, deadline: Instant) -> BodyStream {
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout_at(deadline, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "response deadline exceeded",
                )),
                None,
            )),
        }
    })
    .boxed()
}
