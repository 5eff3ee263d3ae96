//! Per-key write queue and revision ledger
//!
//! One `WriteQueue` exists per document key. It holds the last revision
//! token the backend issued for that key, a single-flight flag, and a
//! FIFO backlog of writes that have been requested but not yet sent.
//! At most one write per key is ever on the network at a time; queued
//! writes are sent individually, in enqueue order, never merged.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::oneshot;

/// The eventual outcome of one write, resolved exactly once.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<bool>,
}

impl CompletionHandle {
    /// Wait for the write to settle. A dropped provider resolves to
    /// failure rather than hanging.
    pub async fn settled(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

/// A write that has been enqueued but not yet sent.
#[derive(Debug)]
pub(crate) struct QueuedWrite {
    pub model: Value,
    done: oneshot::Sender<bool>,
}

impl QueuedWrite {
    pub fn resolve(self, success: bool) {
        // Receiver may have been dropped; the write itself still counts.
        let _ = self.done.send(success);
    }
}

/// Write queue plus revision ledger for one document key.
#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    rev: Option<String>,
    in_flight: bool,
    backlog: VecDeque<QueuedWrite>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending write and hand back its completion handle.
    pub fn enqueue(&mut self, model: Value) -> CompletionHandle {
        let (done, rx) = oneshot::channel();
        self.backlog.push_back(QueuedWrite { model, done });
        CompletionHandle { rx }
    }

    /// If no write is in flight, mark one in flight and pop the oldest
    /// pending write together with the revision current at dispatch time.
    pub fn begin_dispatch(&mut self) -> Option<(QueuedWrite, Option<String>)> {
        if self.in_flight {
            return None;
        }

        let write = self.backlog.pop_front()?;
        self.in_flight = true;
        Some((write, self.rev.clone()))
    }

    /// Record the outcome of the in-flight write. A successful write
    /// advances the ledger to the returned revision; a failed write
    /// leaves the last known-good revision in place so the next write
    /// still targets a valid base. Returns the next write to dispatch,
    /// if any is queued.
    pub fn settle(
        &mut self,
        success: bool,
        rev: Option<String>,
    ) -> Option<(QueuedWrite, Option<String>)> {
        if success {
            if let Some(rev) = rev {
                self.rev = Some(rev);
            }
        }

        self.in_flight = false;
        self.begin_dispatch()
    }

    /// Bootstrap the ledger from a read response. The backend can return
    /// a stale revision while a write for the same key is in progress,
    /// so a read only seeds the ledger when nothing is in flight and no
    /// revision is known yet. Afterwards the write path owns the ledger.
    pub fn seed_revision(&mut self, rev: Option<String>) {
        if !self.in_flight && self.rev.is_none() {
            self.rev = rev;
        }
    }

    #[cfg(test)]
    pub fn revision(&self) -> Option<&str> {
        self.rev.as_deref()
    }
}
