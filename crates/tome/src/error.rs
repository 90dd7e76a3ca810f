use crate::{
    db::{DatabaseError, config::ConfigError},
    document::DocumentError,
    model::ModelError,
    patch::PatchError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Crate-level error; every module error converts into it.
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    DatabaseError(#[from] DatabaseError),

    #[error(transparent)]
    DocumentError(#[from] DocumentError),

    #[error(transparent)]
    ModelError(#[from] ModelError),

    #[error(transparent)]
    PatchError(#[from] PatchError),
}

impl Error {
    /// True when the error came from a permission check.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(DatabaseError::PermissionDenied(_))
                | Self::DocumentError(DocumentError::Database(
                    DatabaseError::PermissionDenied(_)
                ))
        )
    }

    /// True when the error is a validation failure of a model or document.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ModelError(ModelError::Validation(_))
                | Self::DocumentError(DocumentError::Model(ModelError::Validation(_)))
        )
    }
}
