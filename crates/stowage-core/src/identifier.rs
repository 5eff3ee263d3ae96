//! Object identifiers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Globally addresses one document: a namespace plus a key within it.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    namespace: String,
    key: String,
}

impl Identifier {
    /// Create a new identifier, validating that the key is usable as a
    /// document id.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let key = key.into();

        if key.is_empty() {
            return Err(Error::InvalidIdentifier("key cannot be empty".into()));
        }

        if key.starts_with('_') {
            // Leading underscores are reserved for backend endpoints
            // (_changes, _design, ...).
            return Err(Error::InvalidIdentifier(format!(
                "key cannot start with '_': {}",
                key
            )));
        }

        Ok(Self { namespace, key })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}
