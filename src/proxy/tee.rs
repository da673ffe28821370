//! Stream duplication for serve-and-backfill.
//!
//! One source body, two consumers: the client response and the backfill
//! writer. A pump task owns the source and feeds each consumer through its
//! own bounded channel.
//!
//! ```text
//!                       ┌──► client channel (send().await) ──► response body
//! source ──► pump task ─┤
//!                       └──► backfill channel (try_send) ──► Feed receiver
//! ```
//!
//! - The client is never slowed by the backfill: a full backfill channel
//!   abandons the backfill instead of waiting.
//! - A slow client does slow the pump (that is ordinary backpressure), but
//!   a client that goes away does not stop it: the pump keeps draining the
//!   source for the backfill alone.
//! - The backfill only sees [`Feed::End`] after the source finished
//!   cleanly. A channel that closes without it means "do not store".

use std::io;

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::body::BodyStream;

/// Default client channel capacity, in chunks.
pub const DEFAULT_CLIENT_BUFFER: usize = 16;

/// Default backfill channel capacity, in chunks.
pub const DEFAULT_BACKFILL_BUFFER: usize = 64;

/// One message to the backfill consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    Chunk(Bytes),

    /// The source completed without error
    End,
}

/// Split `source` into a client body and a backfill feed.
///
/// Spawns the pump on the current runtime. `label` names the asset in logs.
pub fn tee(
    source: BodyStream,
    client_buffer: usize,
    backfill_buffer: usize,
    label: String,
) -> (BodyStream, mpsc::Receiver<Feed>) {
    let (client_tx, client_rx) = mpsc::channel(client_buffer.max(1));
    let (backfill_tx, backfill_rx) = mpsc::channel(backfill_buffer.max(1));

    tokio::spawn(pump(source, client_tx, backfill_tx, label));

    let client_body = stream::unfold(client_rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed();

    (client_body, backfill_rx)
}

async fn pump(
    mut source: BodyStream,
    client_tx: mpsc::Sender<io::Result<Bytes>>,
    backfill_tx: mpsc::Sender<Feed>,
    label: String,
) {
    let mut client = Some(client_tx);
    let mut backfill = Some(backfill_tx);

    while let Some(item) = source.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                // Dropping the sender without End abandons the backfill
                if backfill.take().is_some() {
                    warn!(asset = %label, error = %e, "Source failed mid-stream, backfill abandoned");
                }
                if let Some(tx) = client.take() {
                    let _ = tx.send(Err(e)).await;
                }
                return;
            }
        };

        if let Some(tx) = &backfill {
            let delivered = if client.is_some() {
                match tx.try_send(Feed::Chunk(chunk.clone())) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(asset = %label, "Backfill fell behind the client, abandoned");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            } else {
                tx.send(Feed::Chunk(chunk.clone())).await.is_ok()
            };

            if !delivered {
                backfill = None;
            }
        }

        if let Some(tx) = &client {
            if tx.send(Ok(chunk)).await.is_err() {
                debug!(asset = %label, "Client went away, draining for backfill");
                client = None;
            }
        }

        if client.is_none() && backfill.is_none() {
            return;
        }
    }

    // Let the client body finish before waiting on the backfill
    drop(client);

    if let Some(tx) = backfill {
        let _ = tx.send(Feed::End).await;
    }
}
