use crate::{
    db::{DatabaseError, DatabaseOperation, DocumentUpdate, GetResult},
    document::{Document, DocumentKind, ownership::User},
};
use async_trait::async_trait;

///
/// DatabaseBackend
///
/// Concrete persistence behind the operation pipeline. Every primitive
/// receives an operation that has already been validated and normalized by
/// [`Database`](crate::db::Database); backends never see a raw request.
///

#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    async fn get_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<GetResult, DatabaseError>;

    async fn create_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError>;

    async fn update_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<DocumentUpdate>, DatabaseError>;

    async fn delete_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError>;

    /// Scopes that may own flags.
    fn flag_scopes(&self) -> Vec<String>;

    /// Compendium packs an operation may address.
    fn compendium_scopes(&self) -> Vec<String>;

    /// Look up a document by uuid.
    async fn resolve_uuid(&self, _uuid: &str) -> Result<Option<Document>, DatabaseError> {
        Ok(None)
    }

    /// Log sink for operation summaries.
    fn log(&self, level: log::Level, message: &str) {
        log::log!(level, "{message}");
    }
}
