//! Stowage Core - identifiers and domain object types
//!
//! This crate provides the types shared by the persistence adapter and
//! its consumers:
//! - Globally unique object identifiers (namespace + key)
//! - Domain objects carrying an opaque JSON model payload

pub mod error;
pub mod identifier;
pub mod object;

pub use error::{Error, Result};
pub use identifier::Identifier;
pub use object::DomainObject;
