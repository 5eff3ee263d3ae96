//! Change feed subscriber and stream decoder
//!
//! The continuous `_changes` feed delivers one JSON record per remote
//! document mutation, newline-delimited, in chunks with no alignment to
//! record boundaries. The decoder buffers raw bytes and emits a batch
//! only when the buffered data ends exactly on a record separator; a
//! chunk ending mid-record is withheld and joined with the next chunk,
//! so no record is dropped or duplicated across chunk boundaries.

use bytes::BytesMut;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use stowage_core::Identifier;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Server keep-alive interval for the continuous feed, in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 50_000;

/// Maximum bytes withheld between record separators (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// One decoded change record, as the backend emits it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    #[serde(default)]
    pub seq: Value,
    #[serde(default)]
    pub changes: Vec<RevRef>,
    #[serde(default)]
    pub deleted: bool,
}

/// A revision reference inside a change record.
#[derive(Debug, Clone, Deserialize)]
pub struct RevRef {
    pub rev: String,
}

/// A change record paired with the full identifier of the document it
/// concerns. The namespace comes from the subscription.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub identifier: Identifier,
    pub seq: Value,
    pub changes: Vec<RevRef>,
    pub deleted: bool,
}

impl ChangeRecord {
    fn into_event(self, namespace: &str) -> Option<ChangeEvent> {
        let identifier = match Identifier::new(namespace, self.id) {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(error = %e, "skipping change record with unusable id");
                return None;
            }
        };
        Some(ChangeEvent {
            identifier,
            seq: self.seq,
            changes: self.changes,
            deleted: self.deleted,
        })
    }
}

/// Options for a change feed subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Optional `_selector` filter; sent as the request body so the
    /// server only emits matching changes.
    pub filter: Option<Value>,
    /// Keep-alive interval the server is asked to honor.
    pub heartbeat_ms: u64,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            filter: None,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
        }
    }
}

/// How a feed ended.
#[derive(Debug)]
pub enum FeedOutcome {
    /// The server closed the stream cleanly. Not a failure.
    Completed,
    /// The subscription was cancelled or replaced.
    Cancelled,
    /// The transport failed outside of an explicit cancellation. Callers
    /// that want the feed back should resubscribe.
    Errored(Error),
}

/// A live change feed subscription. Dropping it does not cancel the
/// feed; cancellation goes through the provider so that replacement
/// stays race-free.
#[derive(Debug)]
pub struct ChangeSubscription {
    handle: JoinHandle<FeedOutcome>,
}

impl ChangeSubscription {
    pub(crate) fn new(handle: JoinHandle<FeedOutcome>) -> Self {
        Self { handle }
    }

    /// Wait for the feed to end and report how.
    pub async fn finished(self) -> FeedOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            // The task only goes away without an outcome when it is
            // aborted out from under us.
            Err(_) => FeedOutcome::Cancelled,
        }
    }
}

/// Incremental decoder for the newline-delimited change stream.
#[derive(Debug, Default)]
pub struct ChangeDecoder {
    buf: BytesMut,
}

impl ChangeDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Feed one network chunk. Returns a batch of decoded records when
    /// the buffered data ends exactly on a record separator, otherwise
    /// `None`. A heartbeat-only flush decodes to an empty batch.
    /// Records that fail to parse are skipped individually. Errors if
    /// the withheld data grows past `MAX_BUFFER_SIZE` without a
    /// separator.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Vec<ChangeRecord>>> {
        if self.buf.len() + chunk.len() > MAX_BUFFER_SIZE {
            return Err(Error::BufferOverflow {
                size: self.buf.len() + chunk.len(),
                max: MAX_BUFFER_SIZE,
            });
        }

        self.buf.extend_from_slice(chunk);

        if !self.buf.ends_with(b"\n") {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&self.buf);
        let records = text
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ChangeRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping unparsable change record");
                    None
                }
            })
            .collect();

        self.buf.clear();
        Ok(Some(records))
    }
}

/// Drive one feed connection to completion. Runs on its own task; the
/// cancel channel aborts the connection and suppresses further
/// callbacks.
pub(crate) async fn run_feed(
    http: reqwest::Client,
    url: String,
    filter: Option<Value>,
    identifier: Identifier,
    on_batch: Box<dyn Fn(Vec<ChangeEvent>) + Send + Sync>,
    mut cancel: oneshot::Receiver<()>,
) -> FeedOutcome {
    let body = filter.unwrap_or_else(|| Value::Object(Default::default()));
    let request = http.post(&url).json(&body).send();

    // biased: once cancellation is requested, nothing else may win the
    // race, or a callback could fire after the caller has unsubscribed.
    let response = tokio::select! {
        biased;

        _ = &mut cancel => {
            debug!(identifier = %identifier, "change feed cancelled while connecting");
            return FeedOutcome::Cancelled;
        }
        result = request => match result.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => return FeedOutcome::Errored(e.into()),
        },
    };

    debug!(identifier = %identifier, "change feed streaming");

    let mut stream = response.bytes_stream();
    let mut decoder = ChangeDecoder::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel => {
                debug!(identifier = %identifier, "change feed cancelled");
                return FeedOutcome::Cancelled;
            }
            chunk = stream.next() => match chunk {
                None => {
                    debug!(identifier = %identifier, "change feed completed");
                    return FeedOutcome::Completed;
                }
                Some(Err(e)) => {
                    debug!(identifier = %identifier, error = %e, "change feed transport error");
                    return FeedOutcome::Errored(e.into());
                }
                Some(Ok(bytes)) => match decoder.feed(&bytes) {
                    Err(e) => {
                        debug!(identifier = %identifier, error = %e, "change feed buffer overflow");
                        return FeedOutcome::Errored(e);
                    }
                    Ok(None) => {}
                    Ok(Some(records)) => {
                        if records.is_empty() {
                            continue;
                        }
                        debug!(identifier = %identifier, count = records.len(), "received changes from server");
                        let namespace = identifier.namespace();
                        let events: Vec<ChangeEvent> = records
                            .into_iter()
                            .filter_map(|record| record.into_event(namespace))
                            .collect();
                        if !events.is_empty() {
                            on_batch(events);
                        }
                    }
                }
            }
        }
    }
}
