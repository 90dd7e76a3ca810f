//! CRUD orchestration.
//!
//! Every action runs the same ladder: per-document pre-hooks (which may veto
//! a single document), the batch pre-hook (which may veto everything), the
//! backend call through [`Database`], then the batch post-hook and finally
//! the per-document post-hooks. Post-hooks run sequentially in result order.

use crate::{
    db::{Action, Database, DatabaseError, DatabaseOperation, GetResult},
    document::{Document, DocumentError, DocumentKind, DocumentOptions, ownership::User},
    model::ModelError,
    patch::kind_label,
};
use serde_json::{Value, json};

// ======================================================================
// Get
// ======================================================================

pub async fn get_documents(
    kind: &'static dyn DocumentKind,
    db: &Database,
    mut operation: DatabaseOperation,
    user: &User,
) -> Result<GetResult, DocumentError> {
    Ok(db.get(kind, &mut operation, user).await?)
}

// ======================================================================
// Create
// ======================================================================

/// Create documents from raw data. Returns the documents the backend
/// created; vetoed documents are silently left out.
pub async fn create_documents(
    kind: &'static dyn DocumentKind,
    db: &Database,
    data: Vec<Value>,
    mut operation: DatabaseOperation,
    user: &User,
) -> Result<Vec<Document>, DocumentError> {
    operation.data = Some(Value::Array(data));
    db.configure(Action::Create, &mut operation).await?;

    let options = pending_options(kind, &operation)?;
    let items = operation.data_items().to_vec();

    let mut pending = Vec::with_capacity(items.len());
    for data in &items {
        let mut document = Document::new(kind, data.clone(), options.clone())?;
        if kind.pre_create(&mut document, data, &operation, user).await? {
            pending.push(document);
        } else {
            log::debug!("{} creation vetoed by pre_create", kind.metadata().name);
        }
    }
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    if !kind.pre_create_operation(&mut pending, &mut operation, user).await? || pending.is_empty() {
        log::debug!("{} create operation vetoed", kind.metadata().name);
        return Ok(Vec::new());
    }

    operation.data = Some(Value::Array(
        pending.iter().map(|document| document.to_object(true)).collect(),
    ));
    let created = db.create(kind, &mut operation, user).await?;

    kind.on_create_operation(&created, &operation, user).await?;
    for document in &created {
        kind.on_create(document, document.source(), &operation, &user.id)
            .await?;
    }

    Ok(created)
}

// parent link and pack handed to documents that are not yet persisted
fn pending_options(
    kind: &'static dyn DocumentKind,
    operation: &DatabaseOperation,
) -> Result<DocumentOptions, DocumentError> {
    let mut options = DocumentOptions::default();

    match operation.parent.as_deref() {
        Some(parent) => {
            let (field, _) = parent.embedded_kind(kind.metadata().name)?;
            options = options.with_parent(parent.link(), field);
        }
        None => options.pack.clone_from(&operation.pack),
    }

    Ok(options)
}

// ======================================================================
// Update
// ======================================================================

/// Apply a batch of `{ _id, ...changes }` updates. Returns the documents the
/// backend updated.
pub async fn update_documents(
    kind: &'static dyn DocumentKind,
    db: &Database,
    updates: Vec<Value>,
    mut operation: DatabaseOperation,
    user: &User,
) -> Result<Vec<Document>, DocumentError> {
    operation.updates = Some(Value::Array(updates));
    db.configure(Action::Update, &mut operation).await?;

    let updates = operation.update_items().to_vec();
    let ids: Vec<String> = updates
        .iter()
        .filter_map(|update| update.get("_id").and_then(Value::as_str).map(str::to_string))
        .collect();
    let current = fetch(kind, db, &operation, Some(ids.as_slice()), user).await?;

    let mut accepted = Vec::with_capacity(updates.len());
    let mut targets = Vec::with_capacity(updates.len());
    for update in updates {
        let id = update_id(&update)?;
        let document = find(kind, &current, &id)?;

        let mut changes = Value::Object(document.validate_changes(update, false)?);
        if !kind.pre_update(document, &mut changes, &operation, user).await? {
            log::debug!("{} update of {id} vetoed by pre_update", kind.metadata().name);
            continue;
        }
        let mut changes = match changes {
            Value::Object(changes) => changes,
            other => {
                return Err(ModelError::ChangesNotObject {
                    model: kind.name(),
                    actual: kind_label(&other),
                }
                .into());
            }
        };
        changes.insert("_id".to_string(), Value::String(id));

        accepted.push(Value::Object(changes));
        targets.push(document.clone());
    }
    if accepted.is_empty() {
        return Ok(Vec::new());
    }

    if !kind.pre_update_operation(&targets, &mut operation, user).await? {
        log::debug!("{} update operation vetoed", kind.metadata().name);
        return Ok(Vec::new());
    }

    operation.updates = Some(Value::Array(accepted));
    let results = db.update(kind, &mut operation, user).await?;
    let documents: Vec<Document> = results.iter().map(|result| result.document.clone()).collect();

    kind.on_update_operation(&documents, &operation, user).await?;
    for result in &results {
        kind.on_update(&result.document, &result.changes, &operation, &user.id)
            .await?;
    }

    Ok(documents)
}

fn update_id(update: &Value) -> Result<String, DocumentError> {
    update
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            DatabaseError::InvalidOperation {
                action: Action::Update,
                message: "every update must carry the _id of its target document".to_string(),
            }
            .into()
        })
}

// ======================================================================
// Delete
// ======================================================================

/// Delete documents by id, or every document in scope with `deleteAll`.
/// Returns the documents the backend deleted.
pub async fn delete_documents(
    kind: &'static dyn DocumentKind,
    db: &Database,
    ids: Vec<String>,
    mut operation: DatabaseOperation,
    user: &User,
) -> Result<Vec<Document>, DocumentError> {
    operation.ids = Some(json!(ids));
    db.configure(Action::Delete, &mut operation).await?;

    let delete_all = operation.delete_all == Some(true);
    let targets = if delete_all {
        fetch(kind, db, &operation, None, user).await?
    } else {
        let current = fetch(kind, db, &operation, Some(ids.as_slice()), user).await?;
        ids.iter()
            .map(|id| find(kind, &current, id).cloned())
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut accepted = Vec::with_capacity(targets.len());
    for document in targets {
        if kind.pre_delete(&document, &operation, user).await? {
            accepted.push(document);
        } else {
            log::debug!("{} deletion vetoed by pre_delete", kind.metadata().name);
        }
    }
    if accepted.is_empty() {
        return Ok(Vec::new());
    }

    if !kind.pre_delete_operation(&accepted, &mut operation, user).await? {
        log::debug!("{} delete operation vetoed", kind.metadata().name);
        return Ok(Vec::new());
    }

    // the surviving ids are explicit so a vetoed document is never swept up
    operation.ids = Some(json!(accepted.iter().filter_map(Document::id).collect::<Vec<_>>()));
    operation.delete_all = Some(false);
    let deleted = db.delete(kind, &mut operation, user).await?;

    kind.on_delete_operation(&deleted, &operation, user).await?;
    for document in &deleted {
        kind.on_delete(document, &operation, &user.id).await?;
    }

    Ok(deleted)
}

// ======================================================================
// Helpers
// ======================================================================

// current documents in the operation's scope, optionally restricted to ids
async fn fetch(
    kind: &'static dyn DocumentKind,
    db: &Database,
    operation: &DatabaseOperation,
    ids: Option<&[String]>,
    user: &User,
) -> Result<Vec<Document>, DocumentError> {
    let mut query = DatabaseOperation {
        query: ids.map(|ids| json!({ "_id": ids })),
        parent: operation.parent.clone(),
        parent_uuid: operation.parent_uuid.clone(),
        pack: operation.pack.clone(),
        ..DatabaseOperation::default()
    };

    Ok(db.get(kind, &mut query, user).await?.into_documents())
}

fn find<'a>(
    kind: &'static dyn DocumentKind,
    documents: &'a [Document],
    id: &str,
) -> Result<&'a Document, DocumentError> {
    documents
        .iter()
        .find(|document| document.id() == Some(id))
        .ok_or_else(|| {
            DatabaseError::NotFound {
                document_name: kind.metadata().name,
                id: id.to_string(),
            }
            .into()
        })
}

impl Document {
    // ======================================================================
    // Instance conveniences
    // ======================================================================

    /// Create a single document. `None` when a hook vetoed the creation.
    pub async fn create(
        kind: &'static dyn DocumentKind,
        db: &Database,
        data: Value,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Option<Self>, DocumentError> {
        Ok(create_documents(kind, db, vec![data], operation, user)
            .await?
            .into_iter()
            .next())
    }

    /// Persist changes to this document. `None` when a hook vetoed the update.
    pub async fn update(
        &self,
        db: &Database,
        changes: Value,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Option<Self>, DocumentError> {
        let id = self.require_id()?;
        let mut changes = match changes {
            Value::Object(changes) => changes,
            other => {
                return Err(ModelError::ChangesNotObject {
                    model: self.document_name(),
                    actual: kind_label(&other),
                }
                .into());
            }
        };
        changes.insert("_id".to_string(), Value::String(id));

        Ok(update_documents(
            self.kind(),
            db,
            vec![Value::Object(changes)],
            self.scoped(operation),
            user,
        )
        .await?
        .into_iter()
        .next())
    }

    /// Delete this document. `None` when a hook vetoed the deletion.
    pub async fn delete(
        &self,
        db: &Database,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Option<Self>, DocumentError> {
        let id = self.require_id()?;

        Ok(delete_documents(self.kind(), db, vec![id], self.scoped(operation), user)
            .await?
            .into_iter()
            .next())
    }

    pub async fn create_embedded_documents(
        &self,
        db: &Database,
        embedded_name: &str,
        data: Vec<Value>,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Self>, DocumentError> {
        let (_, kind) = self.embedded_kind(embedded_name)?;

        create_documents(kind, db, data, self.as_parent(operation)?, user).await
    }

    pub async fn update_embedded_documents(
        &self,
        db: &Database,
        embedded_name: &str,
        updates: Vec<Value>,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Self>, DocumentError> {
        let (_, kind) = self.embedded_kind(embedded_name)?;

        update_documents(kind, db, updates, self.as_parent(operation)?, user).await
    }

    pub async fn delete_embedded_documents(
        &self,
        db: &Database,
        embedded_name: &str,
        ids: Vec<String>,
        operation: DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Self>, DocumentError> {
        let (_, kind) = self.embedded_kind(embedded_name)?;

        delete_documents(kind, db, ids, self.as_parent(operation)?, user).await
    }

    fn require_id(&self) -> Result<String, DocumentError> {
        self.id().map(str::to_string).ok_or(DocumentError::Unsaved {
            document_name: self.document_name(),
        })
    }

    // an operation addressed at this document's own location
    fn scoped(&self, mut operation: DatabaseOperation) -> DatabaseOperation {
        if operation.parent.is_none() && operation.parent_uuid.is_none() {
            operation.parent_uuid = self.parent().and_then(|link| link.uuid.clone());
        }
        if operation.pack.is_none() && !self.is_embedded() {
            operation.pack = self.pack().map(str::to_string);
        }

        operation
    }

    // an operation addressed at this document's embedded children
    fn as_parent(&self, mut operation: DatabaseOperation) -> Result<DatabaseOperation, DocumentError> {
        self.require_id()?;
        operation.parent = Some(Box::new(self.clone()));
        operation.parent_uuid = None;

        Ok(operation)
    }
}
