//! Operation pipeline.
//!
//! [`Database`] is a stateless mediator: each entry point configures the
//! operation (shape checks, parent resolution, pack allow-list, timestamp,
//! per-action defaults) and then dispatches to a [`DatabaseBackend`]
//! primitive. It never touches storage itself.

mod backend;
pub mod config;
pub mod memory;
mod operation;


pub use crate::document::ownership::Action;
pub use backend::DatabaseBackend;
pub use config::{BackendConfig, ConfigError, PackConfig};
pub use memory::InMemoryBackend;
pub use operation::DatabaseOperation;

use crate::{
    Source,
    document::{Document, DocumentKind, ownership::User},
    model::ModelError,
};
use serde_json::Value;
use std::{fmt::Write as _, sync::Arc};
use thiserror::Error as ThisError;
use time::OffsetDateTime;

///
/// DatabaseError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum DatabaseError {
    #[error("{document_name} [{id}] already exists")]
    AlreadyExists {
        document_name: &'static str,
        id: String,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid {action} operation: {message}")]
    InvalidOperation { action: Action, message: String },

    #[error("pack \"{0}\" is not a registered compendium")]
    InvalidPack(String),

    #[error("invalid parent: {0}")]
    InvalidParent(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{document_name} [{id}] does not exist")]
    NotFound {
        document_name: &'static str,
        id: String,
    },

    #[error("parent document {0} does not exist")]
    ParentNotFound(String),

    #[error("{0}")]
    PermissionDenied(String),
}

///
/// GetResult
///
/// Documents, or lightweight index records when the operation asked for
/// `index`.
///

#[derive(Clone, Debug)]
pub enum GetResult {
    Documents(Vec<Document>),
    Index(Vec<Value>),
}

impl GetResult {
    /// The retrieved documents; empty for an index result.
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Documents(documents) => documents,
            Self::Index(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Documents(documents) => documents.len(),
            Self::Index(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

///
/// DocumentUpdate
///
/// An updated document with the diff the backend applied to it.
///

#[derive(Clone, Debug)]
pub struct DocumentUpdate {
    pub document: Document,
    pub changes: Source,
}

///
/// Database
///

#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn DatabaseBackend>,
}

impl Database {
    #[must_use]
    pub fn new(backend: impl DatabaseBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn from_arc(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &dyn DatabaseBackend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn flag_scopes(&self) -> Vec<String> {
        self.backend.flag_scopes()
    }

    // ======================================================================
    // Entry points
    // ======================================================================

    pub async fn get(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &mut DatabaseOperation,
        user: &User,
    ) -> Result<GetResult, DatabaseError> {
        self.configure(Action::Get, operation).await?;

        self.backend.get_documents(kind, operation, user).await
    }

    pub async fn create(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &mut DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError> {
        self.configure(Action::Create, operation).await?;
        let created = self.backend.create_documents(kind, operation, user).await?;

        let ids: Vec<&str> = created.iter().filter_map(Document::id).collect();
        self.log_operation(Action::Create, kind.metadata().name, &ids, operation);

        Ok(created)
    }

    pub async fn update(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &mut DatabaseOperation,
        user: &User,
    ) -> Result<Vec<DocumentUpdate>, DatabaseError> {
        self.configure(Action::Update, operation).await?;
        let updated = self.backend.update_documents(kind, operation, user).await?;

        let ids: Vec<&str> = updated
            .iter()
            .filter_map(|update| update.document.id())
            .collect();
        self.log_operation(Action::Update, kind.metadata().name, &ids, operation);

        Ok(updated)
    }

    pub async fn delete(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &mut DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError> {
        self.configure(Action::Delete, operation).await?;
        let deleted = self.backend.delete_documents(kind, operation, user).await?;

        let ids: Vec<&str> = deleted.iter().filter_map(Document::id).collect();
        self.log_operation(Action::Delete, kind.metadata().name, &ids, operation);

        Ok(deleted)
    }

    // ======================================================================
    // Configure
    // ======================================================================

    /// Validate and normalize an operation in place. Safe to repeat.
    pub async fn configure(&self, action: Action, operation: &mut DatabaseOperation) -> Result<(), DatabaseError> {
        check_shape(action, operation)?;
        self.resolve_parent(operation).await?;

        if let Some(pack) = &operation.pack
            && !self.backend.compendium_scopes().contains(pack)
        {
            return Err(DatabaseError::InvalidPack(pack.clone()));
        }
        operation.modified_time = Some(now_millis());

        match action {
            Action::Get => operation.broadcast = Some(false),
            Action::Create => {
                default_flag(&mut operation.render, true);
                default_flag(&mut operation.render_sheet, false);
            }
            Action::Update => {
                default_flag(&mut operation.diff, true);
                default_flag(&mut operation.recursive, true);
                default_flag(&mut operation.render, true);
            }
            Action::Delete => {
                default_flag(&mut operation.delete_all, false);
                default_flag(&mut operation.render, true);
            }
        }

        Ok(())
    }

    /// Attach the parent document, from a direct reference or by uuid. An
    /// embedded operation always lives in its parent's pack.
    pub async fn resolve_parent(&self, operation: &mut DatabaseOperation) -> Result<(), DatabaseError> {
        if let Some(parent) = operation.parent.as_deref() {
            let uuid = parent.uuid().ok_or_else(|| {
                DatabaseError::InvalidParent(format!(
                    "{} has not been persisted",
                    parent.document_name()
                ))
            })?;
            operation.parent_uuid = Some(uuid);
        } else if let Some(uuid) = operation.parent_uuid.clone() {
            let parent = self
                .backend
                .resolve_uuid(&uuid)
                .await?
                .ok_or(DatabaseError::ParentNotFound(uuid))?;
            operation.parent = Some(Box::new(parent));
        }

        if let Some(parent) = operation.parent.as_deref() {
            operation.pack = parent.pack().map(str::to_string);
        }

        Ok(())
    }

    // ======================================================================
    // Logging
    // ======================================================================

    /// Send an operation summary to the backend's log sink.
    pub fn log_operation(
        &self,
        action: Action,
        document_name: &str,
        ids: &[&str],
        operation: &DatabaseOperation,
    ) {
        self.backend.log(
            log::Level::Info,
            &describe_operation(action, document_name, ids, operation),
        );
    }
}

fn check_shape(action: Action, operation: &DatabaseOperation) -> Result<(), DatabaseError> {
    let invalid = |message: &str| DatabaseError::InvalidOperation {
        action,
        message: message.to_string(),
    };
    let objects = |value: Option<&Value>| {
        value
            .and_then(Value::as_array)
            .is_some_and(|items| items.iter().all(Value::is_object))
    };

    match action {
        Action::Get if operation.query.as_ref().is_some_and(|query| !query.is_object()) => Err(
            invalid("The query provided to the DatabaseBackend#get operation must be an object"),
        ),
        Action::Create if !objects(operation.data.as_ref()) => Err(invalid(
            "The data provided to the DatabaseBackend#create operation must be an array of data objects",
        )),
        Action::Update if !objects(operation.updates.as_ref()) => Err(invalid(
            "The updates provided to the DatabaseBackend#update operation must be an array of data objects",
        )),
        Action::Delete
            if !operation
                .ids
                .as_ref()
                .and_then(Value::as_array)
                .is_some_and(|ids| ids.iter().all(Value::is_string)) =>
        {
            Err(invalid(
                "The document ids provided to the DatabaseBackend#delete operation must be an array of strings",
            ))
        }
        _ => Ok(()),
    }
}

fn default_flag(slot: &mut Option<bool>, value: bool) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

    i64::try_from(millis).unwrap_or(i64::MAX)
}

// ======================================================================
// Messages
// ======================================================================

/// One-line summary of an operation: action, document type, the affected
/// ids (up to five) or their count, and the parent or pack context.
#[must_use]
pub fn describe_operation(
    action: Action,
    document_name: &str,
    ids: &[&str],
    operation: &DatabaseOperation,
) -> String {
    let mut message = match ids {
        [] => format!("{action} no {document_name} documents"),
        [id] => format!("{action} {document_name} [{id}]"),
        ids if ids.len() <= 5 => format!(
            "{action} {} {document_name} documents [{}]",
            ids.len(),
            ids.join(", ")
        ),
        ids => format!("{action} {} {document_name} documents", ids.len()),
    };
    push_context(
        &mut message,
        operation.parent_uuid.as_deref(),
        operation.pack.as_deref(),
    );

    message
}

/// Diagnostic for a denied action.
#[must_use]
pub fn permission_error(
    user: &User,
    action: Action,
    subject: &str,
    parent_uuid: Option<&str>,
    pack: Option<&str>,
) -> String {
    let mut message = format!("User {} lacks permission to {action} {subject}", user.name);
    push_context(&mut message, parent_uuid, pack);

    message
}

fn push_context(message: &mut String, parent_uuid: Option<&str>, pack: Option<&str>) {
    if let Some(uuid) = parent_uuid {
        let _ = write!(message, " in parent {uuid}");
    }
    if let Some(pack) = pack {
        let _ = write!(message, " in pack {pack}");
    }
}
