//! Wire document codec
//!
//! Translates between in-memory domain objects and the CouchDB wire
//! representation. The codec is namespace-agnostic: the namespace is
//! supplied by the caller when decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stowage_core::{DomainObject, Identifier};

/// Wire form of a stored document: `{_id, _rev?, model}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    pub model: Value,
}

impl CouchDocument {
    /// Encode a model for a write. `rev` must be the last revision the
    /// backend issued for this id, or `None` for a first write.
    pub fn encode(identifier: &Identifier, model: Value, rev: Option<String>) -> Self {
        Self {
            id: identifier.key().to_string(),
            rev,
            model,
        }
    }

    /// Decode into a domain object plus the revision token. The key is
    /// derived from the document id; the namespace comes from the caller.
    pub fn into_object(self, namespace: &str) -> Option<(DomainObject, Option<String>)> {
        let identifier = Identifier::new(namespace, self.id).ok()?;
        Some((DomainObject::new(identifier, self.model), self.rev))
    }
}

/// Backend acknowledgement of a `PUT`: `{ok, id, rev}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
}
