//! Domain objects

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain object: an identifier plus an opaque model payload.
///
/// The model is carried as raw JSON; the persistence layer never
/// inspects it beyond serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainObject {
    pub identifier: Identifier,
    pub model: Value,
}

impl DomainObject {
    pub fn new(identifier: Identifier, model: Value) -> Self {
        Self { identifier, model }
    }
}
