//! Object provider - get/create/update over HTTP plus change feed
//! ownership
//!
//! One provider instance serves one backend database and one namespace.
//! Writes are funneled through a per-key write queue so that no two
//! writes for the same key are ever on the network at once; change feed
//! subscriptions are tracked per identifier so that replacement always
//! aborts the previous connection first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use stowage_core::{DomainObject, Identifier};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::changes::{self, ChangeEvent, ChangeSubscription, SubscribeOptions};
use crate::document::{CouchDocument, WriteAck};
use crate::error::{Error, Result};
use crate::queue::{CompletionHandle, QueuedWrite, WriteQueue};

/// Client-side persistence adapter for a CouchDB-style document store.
pub struct CouchObjectProvider {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    /// Write queue and revision ledger per document key, created lazily
    /// on first write or read.
    queues: DashMap<String, WriteQueue>,
    /// Cancellation side of the live change feed per document key.
    feeds: DashMap<String, FeedSlot>,
    feed_counter: AtomicU64,
}

struct FeedSlot {
    seq: u64,
    cancel: oneshot::Sender<()>,
}

impl CouchObjectProvider {
    /// Create a provider for the database at `base_url`, tagging every
    /// object it hands out with `namespace`.
    pub fn new(base_url: impl Into<String>, namespace: impl Into<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url, namespace)
    }

    /// Create a provider using a preconfigured HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidUrl(base_url));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                namespace: namespace.into(),
                queues: DashMap::new(),
                feeds: DashMap::new(),
                feed_counter: AtomicU64::new(0),
            }),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Fetch one object. Absence, a non-success status, and transport
    /// failures all read as "object does not exist"; callers treat
    /// `None` as absence, not as an error.
    pub async fn get(&self, identifier: &Identifier) -> Option<DomainObject> {
        let key = identifier.key();
        let url = format!("{}/{}", self.inner.base_url, key);

        let response = match self.inner.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(key, error = %e, "read request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(key, status = %response.status(), "document not found");
            return None;
        }

        let doc: CouchDocument = match response.json().await {
            Ok(doc) => doc,
            Err(e) => {
                debug!(key, error = %e, "unreadable document");
                return None;
            }
        };

        let (object, rev) = doc.into_object(&self.inner.namespace)?;

        // The backend can return a stale revision while a write is in
        // progress; the queue only accepts the seed when it has no
        // revision of its own yet.
        self.inner
            .queues
            .entry(key.to_string())
            .or_insert_with(WriteQueue::new)
            .seed_revision(rev);

        Some(object)
    }

    /// Store a new object. The first write for a key carries no
    /// revision; the acknowledgement seeds the ledger for every write
    /// after it.
    pub fn create(&self, object: DomainObject) -> CompletionHandle {
        self.enqueue_write(object)
    }

    /// Store a new version of an existing object.
    pub fn update(&self, object: DomainObject) -> CompletionHandle {
        self.enqueue_write(object)
    }

    fn enqueue_write(&self, object: DomainObject) -> CompletionHandle {
        let identifier = object.identifier;
        let key = identifier.key().to_string();

        let (handle, dispatch) = {
            let mut queue = self
                .inner
                .queues
                .entry(key)
                .or_insert_with(WriteQueue::new);
            let handle = queue.enqueue(object.model);
            (handle, queue.begin_dispatch())
        };

        // Nothing was in flight for this key: drain the queue on its own
        // task. Otherwise the in-flight write's drain task picks this
        // one up when it settles.
        if let Some((write, rev)) = dispatch {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.drain(identifier, write, rev).await;
            });
        }

        handle
    }

    /// Watch the change feed for one identifier. If a subscription for
    /// this identifier already exists its connection is aborted first;
    /// at most one live stream per identifier.
    pub fn observe_changes<F>(
        &self,
        identifier: &Identifier,
        options: SubscribeOptions,
        on_batch: F,
    ) -> ChangeSubscription
    where
        F: Fn(Vec<ChangeEvent>) + Send + Sync + 'static,
    {
        self.stop_changes(identifier);

        let key = identifier.key().to_string();
        let seq = self.inner.feed_counter.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inner.feeds.insert(
            key.clone(),
            FeedSlot {
                seq,
                cancel: cancel_tx,
            },
        );

        let mut url = format!(
            "{}/_changes?feed=continuous&style=main_only&heartbeat={}",
            self.inner.base_url, options.heartbeat_ms
        );
        if options.filter.is_some() {
            url.push_str("&filter=_selector");
        }

        info!(identifier = %identifier, "subscribing to change feed");

        let inner = self.inner.clone();
        let identifier = identifier.clone();
        let handle = tokio::spawn(async move {
            let outcome = changes::run_feed(
                inner.http.clone(),
                url,
                options.filter,
                identifier,
                Box::new(on_batch),
                cancel_rx,
            )
            .await;

            // Release the slot unless a replacement already owns it.
            inner.feeds.remove_if(&key, |_, slot| slot.seq == seq);
            outcome
        });

        ChangeSubscription::new(handle)
    }

    /// Cancel the live change feed for one identifier, if any. No
    /// further callbacks fire for it.
    pub fn stop_changes(&self, identifier: &Identifier) {
        if let Some((_, slot)) = self.inner.feeds.remove(identifier.key()) {
            debug!(identifier = %identifier, "aborting change feed");
            let _ = slot.cancel.send(());
        }
    }
}

impl Inner {
    /// Send writes for one key until its backlog is empty. Each write
    /// carries whatever revision the ledger held when it was dispatched.
    async fn drain(
        self: Arc<Self>,
        identifier: Identifier,
        mut write: QueuedWrite,
        mut rev: Option<String>,
    ) {
        let key = identifier.key();

        loop {
            let doc = CouchDocument::encode(&identifier, write.model.clone(), rev);
            let ack = self.put_document(key, &doc).await;

            let (success, new_rev) = match ack {
                Some(ack) if ack.ok => (true, ack.rev),
                _ => (false, None),
            };

            let next = self
                .queues
                .get_mut(key)
                .and_then(|mut queue| queue.settle(success, new_rev));

            write.resolve(success);

            match next {
                Some((next_write, next_rev)) => {
                    write = next_write;
                    rev = next_rev;
                }
                None => break,
            }
        }
    }

    async fn put_document(&self, key: &str, doc: &CouchDocument) -> Option<WriteAck> {
        let url = format!("{}/{}", self.base_url, key);

        match self.http.put(&url).json(doc).send().await {
            Ok(response) => match response.json::<WriteAck>().await {
                Ok(ack) => Some(ack),
                Err(e) => {
                    debug!(key, error = %e, "unreadable write acknowledgement");
                    None
                }
            },
            Err(e) => {
                debug!(key, error = %e, "write request failed");
                None
            }
        }
    }
}
