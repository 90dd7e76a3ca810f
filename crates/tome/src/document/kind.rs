use crate::{
    Source,
    db::DatabaseOperation,
    document::{
        Document, DocumentError,
        ownership::{Permission, User, UserRole},
    },
    model::ModelKind,
};
use async_trait::async_trait;
use serde_json::Value;

///
/// DocumentMetadata
///
/// Static description of a document kind.
///
/// `embedded` maps embedded document names to the field that holds them
/// (`("Item", "items")`).
///

#[derive(Clone, Copy, Debug)]
pub struct DocumentMetadata {
    pub name: &'static str,
    pub collection: &'static str,
    pub embedded: &'static [(&'static str, &'static str)],
    pub has_type_data: bool,
    pub permissions: Permissions,
}

impl DocumentMetadata {
    /// Metadata with default permissions and no embedded kinds.
    #[must_use]
    pub const fn new(name: &'static str, collection: &'static str) -> Self {
        Self {
            name,
            collection,
            embedded: &[],
            has_type_data: false,
            permissions: Permissions::DEFAULT,
        }
    }

    /// Field holding embedded documents of the given name.
    #[must_use]
    pub fn embedded_field(&self, document_name: &str) -> Option<&'static str> {
        self.embedded
            .iter()
            .find(|(name, _)| *name == document_name)
            .map(|(_, field)| *field)
    }
}

///
/// Permissions
///

#[derive(Clone, Copy, Debug)]
pub struct Permissions {
    pub create: Permission,
    pub update: Permission,
    pub delete: Permission,
}

impl Permissions {
    pub const DEFAULT: Self = Self {
        create: Permission::Role(UserRole::Assistant),
        update: Permission::Owner,
        delete: Permission::Role(UserRole::Assistant),
    };
}

impl Default for Permissions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

///
/// DocumentKind
///
/// A model kind that is persisted as a document. Lifecycle hooks run around
/// every CRUD operation: `pre_*` hooks may veto (return `false`) or adjust
/// pending data, the operation-level `pre_*_operation` hooks see the whole
/// batch, and the `on_*` hooks run after the backend committed, first once
/// per batch and then once per document.
///

#[async_trait]
pub trait DocumentKind: ModelKind {
    fn metadata(&self) -> &'static DocumentMetadata;

    // ======================================================================
    // Create
    // ======================================================================

    async fn pre_create(
        &self,
        _document: &mut Document,
        _data: &Value,
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn pre_create_operation(
        &self,
        _documents: &mut Vec<Document>,
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn on_create_operation(
        &self,
        _documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    async fn on_create(
        &self,
        _document: &Document,
        _data: &Source,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    // ======================================================================
    // Update
    // ======================================================================

    async fn pre_update(
        &self,
        _document: &Document,
        _changes: &mut Value,
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn pre_update_operation(
        &self,
        _documents: &[Document],
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn on_update_operation(
        &self,
        _documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    async fn on_update(
        &self,
        _document: &Document,
        _changed: &Source,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    // ======================================================================
    // Delete
    // ======================================================================

    async fn pre_delete(
        &self,
        _document: &Document,
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn pre_delete_operation(
        &self,
        _documents: &[Document],
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        Ok(true)
    }

    async fn on_delete_operation(
        &self,
        _documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    async fn on_delete(
        &self,
        _document: &Document,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        Ok(())
    }
}
