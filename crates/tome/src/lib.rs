//! Core runtime for Tome: schema fields, data models, documents, and the
//! operation pipeline that mediates CRUD requests to a pluggable backend.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod db;
pub mod document;
pub mod error;
pub mod field;
pub mod model;
pub mod patch;
pub mod schema;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;
pub use serde_json::{Map, Value};

///
/// CONSTANTS
///

/// Maximum length of a document identifier.
pub const MAX_ID_LEN: usize = 64;

/// Address prefix used for documents that live in a compendium pack.
pub const COMPENDIUM_PREFIX: &str = "Compendium";

/// Key prefix that marks a deletion inside a change set (`"-=key"`).
pub const DELETION_PREFIX: &str = "-=";

///
/// Source
///
/// A plain key/value record: the authoritative, cleaned data of a model.
///

pub type Source = Map<String, Value>;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, backends, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        Source,
        db::{Database, DatabaseBackend, DatabaseOperation},
        document::{
            Document, DocumentKind, DocumentMetadata, DocumentOptions,
            ownership::{OwnershipLevel, Permission, User, UserRole},
        },
        field::{Field, FieldKind},
        model::{DataModel, ModelKind, ModelOptions, UpdateOptions, ValidateOptions},
        schema::Schema,
    };
    pub use serde_json::{Value, json};
}
