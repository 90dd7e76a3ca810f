//! Documents: data models with identity, embedded children, ownership, and
//! lifecycle hooks around persistence.

pub mod collection;
pub mod crud;
mod flags;
mod kind;
pub mod ownership;

#[cfg(test)]
mod tests;

pub use collection::EmbeddedCollection;
pub use kind::{DocumentKind, DocumentMetadata, Permissions};

use crate::{
    COMPENDIUM_PREFIX, Source,
    db::DatabaseError,
    field::FieldKind,
    model::{DataModel, ModelError, ModelOptions, RawData, UpdateOptions, ValidateOptions},
};
use derive_more::Deref;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use thiserror::Error as ThisError;

///
/// DocumentError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum DocumentError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{document_name} does not define a flags field")]
    FlagsUnsupported { document_name: &'static str },

    #[error("{0}")]
    Hook(String),

    #[error("flag scope \"{0}\" is not valid or not currently active")]
    InvalidFlagScope(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{document_name} has no embedded collection of {embedded_name}")]
    UnknownEmbedded {
        document_name: &'static str,
        embedded_name: String,
    },

    #[error("{document_name} has not been persisted and has no id")]
    Unsaved { document_name: &'static str },
}

///
/// ParentLink
///
/// Identity snapshot of an owning document, held by its embedded children.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParentLink {
    pub document_name: &'static str,
    pub id: Option<String>,
    pub uuid: Option<String>,
    pub pack: Option<String>,
    pub ownership: Option<Value>,
}

///
/// DocumentOptions
///

#[derive(Clone, Debug, Default)]
pub struct DocumentOptions {
    pub model: ModelOptions,
    pub parent: Option<ParentLink>,
    pub parent_collection: Option<&'static str>,
    pub pack: Option<String>,
}

impl DocumentOptions {
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            model: ModelOptions::lenient(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelOptions) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ParentLink, collection: &'static str) -> Self {
        self.parent = Some(parent);
        self.parent_collection = Some(collection);
        self
    }

    #[must_use]
    pub fn in_pack(mut self, pack: impl Into<String>) -> Self {
        self.pack = Some(pack.into());
        self
    }
}

///
/// Document
///
/// Read access to the underlying model goes through `Deref`; mutation goes
/// through the document so identity and embedded links stay consistent.
///

#[derive(Clone, Deref)]
pub struct Document {
    kind: &'static dyn DocumentKind,
    #[deref]
    model: DataModel,
    id: Option<String>,
    parent: Option<ParentLink>,
    parent_collection: Option<&'static str>,
    pack: Option<String>,
}

impl Document {
    // ======================================================================
    // Construction
    // ======================================================================

    pub fn new(
        kind: &'static dyn DocumentKind,
        data: impl Into<RawData>,
        options: DocumentOptions,
    ) -> Result<Self, ModelError> {
        let DocumentOptions {
            model,
            parent,
            parent_collection,
            pack,
        } = options;

        let model = DataModel::prepare(kind, data.into(), model, None)?;
        let pack = pack.or_else(|| parent.as_ref().and_then(|link| link.pack.clone()));
        let mut document = Self {
            kind,
            model,
            id: None,
            parent,
            parent_collection,
            pack,
        };
        document.initialize();

        Ok(document)
    }

    /// Construct from a stored record without strict validation.
    pub fn from_source(kind: &'static dyn DocumentKind, source: Source) -> Result<Self, ModelError> {
        Self::new(kind, source, DocumentOptions::lenient())
    }

    pub(crate) fn embedded(
        kind: &'static dyn DocumentKind,
        source: Source,
        owner: Option<ParentLink>,
        field: &'static str,
        options: ModelOptions,
    ) -> Result<Self, ModelError> {
        Self::new(
            kind,
            source,
            DocumentOptions {
                model: options,
                parent: owner,
                parent_collection: Some(field),
                pack: None,
            },
        )
    }

    /// A copy with `changes` merged over this document's source.
    pub fn clone_with(&self, changes: Value, options: ModelOptions) -> Result<Self, ModelError> {
        let model = self.model.clone_with(changes, options)?;
        let mut document = Self {
            kind: self.kind,
            model,
            id: None,
            parent: self.parent.clone(),
            parent_collection: self.parent_collection,
            pack: self.pack.clone(),
        };
        document.initialize();

        Ok(document)
    }

    // the id is adopted from source once and never reassigned
    fn initialize(&mut self) {
        if self.id.is_none() {
            self.id = self.model.source_id().map(str::to_string);
        }
        let link = self.link();
        self.model.relink_children(Some(link));
        self.model.initialize_view();
    }

    pub(crate) fn relink(&mut self, parent: Option<ParentLink>) {
        if self.parent != parent {
            if let Some(pack) = parent.as_ref().and_then(|link| link.pack.clone()) {
                self.pack = Some(pack);
            }
            self.parent = parent;
        }
        let link = self.link();
        self.model.relink_children(Some(link));
    }

    // ======================================================================
    // Identity
    // ======================================================================

    #[must_use]
    pub fn kind(&self) -> &'static dyn DocumentKind {
        self.kind
    }

    #[must_use]
    pub const fn model(&self) -> &DataModel {
        &self.model
    }

    #[must_use]
    pub fn into_model(self) -> DataModel {
        self.model
    }

    #[must_use]
    pub fn document_name(&self) -> &'static str {
        self.kind.metadata().name
    }

    #[must_use]
    pub fn collection_name(&self) -> &'static str {
        self.kind.metadata().collection
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    #[must_use]
    pub const fn parent_collection(&self) -> Option<&'static str> {
        self.parent_collection
    }

    #[must_use]
    pub fn pack(&self) -> Option<&str> {
        self.pack.as_deref()
    }

    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        self.parent.is_some()
    }

    #[must_use]
    pub const fn in_compendium(&self) -> bool {
        self.pack.is_some()
    }

    /// Universal address: `Name.id`, prefixed by the pack for compendium
    /// documents, or appended to the parent's uuid for embedded documents.
    #[must_use]
    pub fn uuid(&self) -> Option<String> {
        let id = self.id.as_deref()?;
        let name = self.document_name();

        match &self.parent {
            Some(link) => link.uuid.as_ref().map(|uuid| format!("{uuid}.{name}.{id}")),
            None => Some(match &self.pack {
                Some(pack) => format!("{COMPENDIUM_PREFIX}.{pack}.{name}.{id}"),
                None => format!("{name}.{id}"),
            }),
        }
    }

    /// Identity snapshot handed to embedded children.
    #[must_use]
    pub fn link(&self) -> ParentLink {
        let ownership = self
            .model
            .source()
            .get("ownership")
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|link| link.ownership.clone()));

        ParentLink {
            document_name: self.document_name(),
            id: self.id.clone(),
            uuid: self.uuid(),
            pack: self.pack.clone(),
            ownership,
        }
    }

    // ======================================================================
    // Embedded documents
    // ======================================================================

    /// Field and kind that hold embedded documents of the given name.
    pub fn embedded_kind(
        &self,
        embedded_name: &str,
    ) -> Result<(&'static str, &'static dyn DocumentKind), DocumentError> {
        let unknown = || DocumentError::UnknownEmbedded {
            document_name: self.document_name(),
            embedded_name: embedded_name.to_string(),
        };
        let field_name = self
            .kind
            .metadata()
            .embedded_field(embedded_name)
            .ok_or_else(unknown)?;

        match self.schema().get(field_name).map(|field| &field.kind) {
            Some(
                FieldKind::EmbeddedCollection(kind) | FieldKind::EmbeddedDocument(kind),
            ) => Ok((field_name, *kind)),
            _ => Err(unknown()),
        }
    }

    /// The embedded collection holding documents of the given name.
    pub fn get_embedded_collection(
        &self,
        embedded_name: &str,
    ) -> Result<&EmbeddedCollection, DocumentError> {
        let (field, _) = self.embedded_kind(embedded_name)?;

        self.collection(field)
            .ok_or_else(|| DocumentError::UnknownEmbedded {
                document_name: self.document_name(),
                embedded_name: embedded_name.to_string(),
            })
    }

    /// An embedded document by name and id. Invalid children are only
    /// returned when `invalid` is set.
    #[must_use]
    pub fn get_embedded_document(&self, embedded_name: &str, id: &str, invalid: bool) -> Option<&Self> {
        let (field, _) = self.embedded_kind(embedded_name).ok()?;
        if let Some(collection) = self.collection(field) {
            return collection
                .get(id)
                .or_else(|| invalid.then(|| collection.get_invalid(id)).flatten());
        }

        self.singleton(field).filter(|document| document.id() == Some(id))
    }

    // ======================================================================
    // Mutation
    // ======================================================================

    /// Apply a change set atomically; see `DataModel::update_source`.
    pub fn update_source(&mut self, changes: Value, options: UpdateOptions) -> Result<Source, ModelError> {
        let diff = self.model.apply_update(changes, options)?;
        if !options.dry_run {
            self.initialize();
        }

        Ok(diff)
    }

    pub fn validate(&mut self, options: ValidateOptions) -> Result<bool, ModelError> {
        self.model.validate(options)
    }

    /// Rebuild the instance view from source. The id is kept.
    pub fn reset(&mut self) {
        self.model.reset();
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.document_name())
            .field("uuid", &self.uuid())
            .field("source", self.model.source())
            .finish()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.model.serialize(serializer)
    }
}

///
/// ParsedUuid
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedUuid {
    pub pack: Option<String>,
    /// `(document name, id)` pairs from the root document down.
    pub path: Vec<(String, String)>,
}

/// Parse a document uuid. Pack identifiers may contain dots, so the known
/// packs are needed to split a compendium address.
#[must_use]
pub fn parse_uuid(uuid: &str, packs: &[String]) -> Option<ParsedUuid> {
    let (pack, rest) = match uuid
        .strip_prefix(COMPENDIUM_PREFIX)
        .and_then(|rest| rest.strip_prefix('.'))
    {
        Some(rest) => {
            let pack = packs
                .iter()
                .filter(|pack| {
                    rest.strip_prefix(pack.as_str())
                        .is_some_and(|tail| tail.starts_with('.'))
                })
                .max_by_key(|pack| pack.len())?;

            (Some(pack.clone()), &rest[pack.len() + 1..])
        }
        None => (None, uuid),
    };

    let segments: Vec<&str> = rest.split('.').collect();
    if !segments.len().is_multiple_of(2) || segments.iter().any(|segment| segment.is_empty()) {
        return None;
    }

    let path = segments
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect();

    Some(ParsedUuid { pack, path })
}
