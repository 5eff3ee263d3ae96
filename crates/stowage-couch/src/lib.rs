//! Stowage Couch - CouchDB persistence adapter
//!
//! This crate provides the client-side persistence layer for Stowage:
//! - Versioned create/read/update of domain objects over HTTP
//! - Per-key write queues that serialize concurrent writes and thread
//!   revision tokens through every request
//! - A live, cancellable view of remote changes via the continuous
//!   `_changes` feed

pub mod changes;
pub mod document;
pub mod error;
pub mod provider;
pub mod queue;

pub use changes::{
    ChangeDecoder, ChangeEvent, ChangeRecord, ChangeSubscription, FeedOutcome, SubscribeOptions,
    DEFAULT_HEARTBEAT_MS,
};
pub use document::{CouchDocument, WriteAck};
pub use error::{Error, Result};
pub use provider::CouchObjectProvider;
pub use queue::CompletionHandle;
