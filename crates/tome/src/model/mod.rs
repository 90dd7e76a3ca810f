//! Data models: schema-governed records with a derived instance view.
//!
//! A model owns its cleaned `source` record. Everything else (the instance
//! view, embedded children, validation state) is derived from it and kept
//! in lock-step by `update_source`.

pub mod migrate;
mod update;
pub mod view;

#[cfg(test)]
mod tests;

pub use migrate::MigrationError;
pub use update::UpdateOptions;

use crate::{
    Source,
    document::{Document, DocumentKind, ParentLink, collection::EmbeddedCollection},
    field::{CleanOptions, FieldKind, ValidateContext, ValidationFailure},
    patch::{MergeOptions, PatchError, expand_object, get_property, kind_label, merge_object},
    schema::{Schema, schema_for},
};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use thiserror::Error as ThisError;
use view::{InstanceView, ViewEntry};

///
/// ModelKind
///
/// The type-level description of a model: its name, schema, migrations and
/// cross-field rules. Implementors are zero-sized statics; the schema is
/// defined once per root kind and cached.
///

pub trait ModelKind: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Build the schema. Called once per root kind.
    fn define_schema(&self) -> Schema;

    /// Subtypes share the schema of their root ancestor.
    fn base_kind(&self) -> Option<&'static dyn ModelKind> {
        None
    }

    /// Legacy field names (`(legacy, current)`) still accepted on read.
    fn shims(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Rewrite legacy shapes of raw data in place, before cleaning.
    fn migrate_data(&self, _source: &mut Source) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Cross-field rule over a complete record.
    fn validate_joint(&self, _source: &Source) -> Result<(), String> {
        Ok(())
    }

    // ======================================================================
    // Provided
    // ======================================================================

    fn schema(&self) -> &'static Schema {
        schema_for(self)
    }

    /// Run `migrate_data`, logging failures, then migrate nested models.
    fn migrate_data_safe(&self, source: &mut Source) {
        if let Err(err) = self.migrate_data(source) {
            log::error!("{}: data migration failed: {err}", self.name());
        }
        self.schema().migrate_source(source);
    }

    /// Joint rule of this model followed by those of nested models.
    fn validate_model_joint(&self, source: &Source) -> Result<(), String> {
        self.validate_joint(source)?;
        self.schema().validate_joint(source)
    }

    fn clean_data(&self, source: Source, partial: bool) -> Source {
        self.schema().clean(
            source,
            &CleanOptions {
                partial,
                ..CleanOptions::default()
            },
        )
    }
}

///
/// RawData
///
/// Construction input: raw JSON, a plain record, or another model's source.
///

#[derive(Clone, Debug)]
pub enum RawData {
    Value(Value),
    Source(Source),
}

impl From<Value> for RawData {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Source> for RawData {
    fn from(source: Source) -> Self {
        Self::Source(source)
    }
}

impl From<&DataModel> for RawData {
    fn from(model: &DataModel) -> Self {
        Self::Source(model.source.clone())
    }
}

///
/// ModelOptions
///

#[derive(Clone, Copy, Debug)]
pub struct ModelOptions {
    /// Unresolved validation failures abort construction.
    pub strict: bool,
    /// Replace invalid values with initial values where possible.
    pub fallback: bool,
    /// Isolate invalid embedded children instead of failing the parent.
    pub drop_invalid_embedded: bool,
}

impl ModelOptions {
    /// Non-strict construction used when loading stored records.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            strict: false,
            fallback: false,
            drop_invalid_embedded: false,
        }
    }

    #[must_use]
    pub const fn with_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    #[must_use]
    pub const fn with_drop_invalid_embedded(mut self) -> Self {
        self.drop_invalid_embedded = true;
        self
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            strict: true,
            fallback: false,
            drop_invalid_embedded: false,
        }
    }
}

///
/// ValidateOptions
///
/// `changes` switches to partial validation of a change set; joint rules
/// then default to off and may not be enabled.
///

#[derive(Clone, Debug)]
pub struct ValidateOptions {
    pub changes: Option<Value>,
    pub clean: bool,
    pub fallback: bool,
    pub strict: bool,
    pub fields: bool,
    pub joint: Option<bool>,
    pub drop_invalid_embedded: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            changes: None,
            clean: false,
            fallback: false,
            strict: true,
            fields: true,
            joint: None,
            drop_invalid_embedded: false,
        }
    }
}

///
/// ValidationFailures
///
/// Outcome of the most recent validation run.
///

#[derive(Clone, Debug, Default)]
pub struct ValidationFailures {
    pub fields: Option<ValidationFailure>,
    pub joint: Option<ValidationFailure>,
}

impl ValidationFailures {
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.fields
            .as_ref()
            .is_some_and(ValidationFailure::is_unresolved)
            || self.joint.as_ref().is_some_and(ValidationFailure::is_unresolved)
    }
}

///
/// ValidationError
///

#[derive(Clone, Debug, ThisError)]
#[error("{failure}")]
pub struct ValidationError {
    pub model: &'static str,
    pub id: Option<String>,
    pub joint: bool,
    pub failure: ValidationFailure,
}

///
/// ModelError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error("{model} changes must be an object, found {actual}")]
    ChangesNotObject {
        model: &'static str,
        actual: &'static str,
    },

    #[error("{field} [{id}]: {source}")]
    Embedded {
        field: &'static str,
        id: String,
        #[source]
        source: Box<Self>,
    },

    #[error("{field}: embedded documents in an array update must carry an _id")]
    EmbeddedMissingId { field: &'static str },

    #[error("{field}: embedded changes must be an object or array, found {actual}")]
    EmbeddedShape {
        field: &'static str,
        actual: &'static str,
    },

    #[error("joint validation cannot run against a partial change set")]
    JointWithChanges,

    #[error("{model}.{field} is not a plain value and cannot be assigned")]
    NotSettable { model: &'static str, field: String },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("{model}.{field} is readonly and already set")]
    Readonly { model: &'static str, field: String },

    #[error(transparent)]
    Validation(Box<ValidationError>),
}

impl ModelError {
    /// The validation failure carried by this error, if any.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Embedded { source, .. } => source.validation(),
            _ => None,
        }
    }
}

///
/// DataModel
///

#[derive(Clone)]
pub struct DataModel {
    kind: &'static dyn ModelKind,
    source: Source,
    view: InstanceView,
    failures: ValidationFailures,
    owner: Option<ParentLink>,
}

impl DataModel {
    // ======================================================================
    // Construction
    // ======================================================================

    /// Construct a model: migrate, clean, validate, initialize.
    pub fn new(
        kind: &'static dyn ModelKind,
        data: impl Into<RawData>,
        options: ModelOptions,
    ) -> Result<Self, ModelError> {
        let mut model = Self::prepare(kind, data.into(), options, None)?;
        model.initialize_view();

        Ok(model)
    }

    /// Construct from a stored record without strict validation.
    pub fn from_source(kind: &'static dyn ModelKind, source: Source) -> Result<Self, ModelError> {
        Self::new(kind, source, ModelOptions::lenient())
    }

    // everything up to (not including) view initialization
    pub(crate) fn prepare(
        kind: &'static dyn ModelKind,
        data: RawData,
        options: ModelOptions,
        owner: Option<ParentLink>,
    ) -> Result<Self, ModelError> {
        let mut source = match data {
            RawData::Source(source) => source,
            RawData::Value(Value::Object(map)) => map,
            RawData::Value(Value::Null) => Source::new(),
            RawData::Value(other) => {
                log::warn!(
                    "{}: expected object data, found {}; starting from an empty record",
                    kind.name(),
                    kind_label(&other)
                );
                Source::new()
            }
        };

        kind.migrate_data_safe(&mut source);
        let source = kind.clean_data(source, false);

        let mut model = Self {
            kind,
            source,
            view: InstanceView::default(),
            failures: ValidationFailures::default(),
            owner,
        };
        model.validate(ValidateOptions {
            fallback: options.fallback,
            strict: options.strict,
            drop_invalid_embedded: options.drop_invalid_embedded,
            ..ValidateOptions::default()
        })?;

        Ok(model)
    }

    /// A new model from this one's source with `changes` merged over it.
    /// Keys the record does not already have are ignored at the top level.
    pub fn clone_with(&self, changes: Value, options: ModelOptions) -> Result<Self, ModelError> {
        let changes = self.expect_object(expand_object(changes)?)?;
        let mut data = self.source.clone();
        merge_object(
            &mut data,
            changes,
            MergeOptions {
                insert_keys: false,
                ..MergeOptions::update()
            },
        );

        let mut model = Self::prepare(self.kind, RawData::Source(data), options, self.owner.clone())?;
        model.initialize_view();

        Ok(model)
    }

    /// Discard the instance view and rebuild it from source.
    pub fn reset(&mut self) {
        self.view.clear();
        self.initialize_view();
    }

    // ======================================================================
    // Accessors
    // ======================================================================

    #[must_use]
    pub fn kind(&self) -> &'static dyn ModelKind {
        self.kind
    }

    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        self.kind.schema()
    }

    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// The `_id` recorded in source, if any.
    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        self.source.get("_id").and_then(Value::as_str)
    }

    #[must_use]
    pub const fn view(&self) -> &InstanceView {
        &self.view
    }

    #[must_use]
    pub const fn validation_failures(&self) -> &ValidationFailures {
        &self.failures
    }

    /// True when the last validation left an unresolved failure.
    #[must_use]
    pub fn invalid(&self) -> bool {
        self.failures.is_unresolved()
    }

    pub(crate) const fn owner(&self) -> Option<&ParentLink> {
        self.owner.as_ref()
    }

    /// Read an instance value by (dotted) path. Legacy names are resolved
    /// through the schema's shims with a deprecation warning.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let canonical = self.schema().canonical_path(path);
        if canonical != path {
            log::warn!(
                "{}: '{path}' is deprecated, use '{canonical}' instead",
                self.kind.name()
            );
        }

        let (head, rest) = match canonical.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (canonical.as_str(), None),
        };
        let value = self.view.get(head)?.value(&self.source);

        match rest {
            Some(rest) => get_property(&value, rest).cloned(),
            None => Some(value),
        }
    }

    /// Assign a plain instance value. Source is not touched.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        match self.view.get_mut(name) {
            Some(ViewEntry::Value(current)) => {
                *current = value;
                Ok(())
            }
            _ => Err(ModelError::NotSettable {
                model: self.kind.name(),
                field: name.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&EmbeddedCollection> {
        match self.view.get(name)? {
            ViewEntry::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    #[must_use]
    pub fn singleton(&self, name: &str) -> Option<&Document> {
        match self.view.get(name)? {
            ViewEntry::Singleton(document) => document.as_deref(),
            _ => None,
        }
    }

    /// Serialize the model. `source = true` returns a copy of the source;
    /// otherwise the instance view is projected back, skipping computed
    /// fields.
    #[must_use]
    pub fn to_object(&self, source: bool) -> Value {
        if source {
            return Value::Object(self.source.clone());
        }

        let mut out = Source::new();
        for field in self.schema().iter() {
            let Some(entry) = self.view.get(field.name) else {
                continue;
            };
            let value = match entry {
                ViewEntry::Value(value) | ViewEntry::Readonly(value) => value.clone(),
                ViewEntry::Getter(_) => continue,
                ViewEntry::Collection(collection) => Value::Array(
                    collection
                        .iter_all()
                        .map(|document| document.to_object(false))
                        .collect(),
                ),
                ViewEntry::Singleton(Some(document)) => document.to_object(false),
                ViewEntry::Singleton(None) => Value::Null,
            };
            out.insert(field.name.to_string(), value);
        }

        Value::Object(out)
    }

    // ======================================================================
    // Validation
    // ======================================================================

    /// Validate the source, or a change set when `changes` is given.
    ///
    /// Returns `Ok(false)` when non-strict validation left the model invalid.
    pub fn validate(&mut self, options: ValidateOptions) -> Result<bool, ModelError> {
        let ValidateOptions {
            changes,
            clean,
            fallback,
            strict,
            fields,
            joint,
            drop_invalid_embedded,
        } = options;

        let partial = changes.is_some();
        let joint = joint.unwrap_or(!partial);
        if partial && joint {
            return Err(ModelError::JointWithChanges);
        }
        self.failures = ValidationFailures::default();

        if fields {
            let failure = match changes {
                Some(changes) => {
                    self.check_changes(changes, clean, fallback, drop_invalid_embedded)?
                        .1
                }
                None => {
                    let ctx = ValidateContext {
                        fallback,
                        drop_invalid_embedded,
                        ..ValidateContext::default()
                    };
                    let mut source = std::mem::take(&mut self.source);
                    let failure = self.schema().validate(&mut source, &ctx);
                    self.source = source;
                    failure.map(|failure| self.label_failure(failure))
                }
            };
            if let Some(failure) = failure {
                self.record_fields(failure, strict)?;
            }
        }

        if joint && let Err(message) = self.kind.validate_model_joint(&self.source) {
            self.record_joint(&message, strict)?;
        }

        Ok(!self.invalid())
    }

    /// Clean and strictly validate a change set against this model without
    /// modifying it. Returns the cleaned change set.
    pub fn validate_changes(&self, changes: Value, fallback: bool) -> Result<Source, ModelError> {
        let (changes, failure) = self.check_changes(changes, true, fallback, false)?;
        match failure {
            Some(failure) if failure.is_unresolved() => Err(self.validation_error(failure, false)),
            _ => Ok(changes),
        }
    }

    fn check_changes(
        &self,
        changes: Value,
        clean: bool,
        fallback: bool,
        drop_invalid_embedded: bool,
    ) -> Result<(Source, Option<ValidationFailure>), ModelError> {
        let changes = self.expect_object(expand_object(changes)?)?;
        let schema = self.schema();
        let mut changes = if clean {
            schema.clean(changes, &CleanOptions::partial(Some(&self.source)))
        } else {
            changes
        };

        let ctx = ValidateContext {
            partial: true,
            fallback,
            drop_invalid_embedded,
            source: Some(&self.source),
            type_name: None,
        };
        let failure = schema
            .validate(&mut changes, &ctx)
            .map(|failure| self.label_failure(failure));

        Ok((changes, failure))
    }

    fn record_fields(&mut self, failure: ValidationFailure, strict: bool) -> Result<(), ModelError> {
        let unresolved = failure.is_unresolved();
        self.failures.fields = Some(failure.clone());

        if unresolved && strict {
            return Err(self.validation_error(failure, false));
        }
        if unresolved {
            log::warn!("{failure}");
        } else {
            log::info!("{failure}");
        }

        Ok(())
    }

    fn record_joint(&mut self, message: &str, strict: bool) -> Result<(), ModelError> {
        let failure = ValidationFailure::message(format!(
            "{} joint validation error: {message}",
            self.label()
        ));
        self.failures.joint = Some(failure.clone());

        if strict {
            return Err(self.validation_error(failure, true));
        }
        log::warn!("{failure}");

        Ok(())
    }

    fn label_failure(&self, mut failure: ValidationFailure) -> ValidationFailure {
        failure.message = Some(format!("{} validation errors", self.label()));
        failure
    }

    fn validation_error(&self, failure: ValidationFailure, joint: bool) -> ModelError {
        ModelError::Validation(Box::new(ValidationError {
            model: self.kind.name(),
            id: self.source_id().map(str::to_string),
            joint,
            failure,
        }))
    }

    fn label(&self) -> String {
        match self.source_id() {
            Some(id) => format!("{} [{id}]", self.kind.name()),
            None => self.kind.name().to_string(),
        }
    }

    fn expect_object(&self, value: Value) -> Result<Source, ModelError> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ModelError::ChangesNotObject {
                model: self.kind.name(),
                actual: kind_label(&other),
            }),
        }
    }

    // ======================================================================
    // Initialization
    // ======================================================================

    /// Build (or relink) the instance view from source. Existing embedded
    /// children whose source still matches are relinked, not rebuilt.
    pub(crate) fn initialize_view(&mut self) {
        for field in self.schema().initialization_order() {
            match &field.kind {
                FieldKind::EmbeddedCollection(kind) => self.initialize_collection(field.name, *kind),
                FieldKind::EmbeddedDocument(kind) => self.initialize_singleton(field.name, *kind),
                _ => {
                    let value = self.source.get(field.name).unwrap_or(&Value::Null);
                    let entry = field.initialize(value);
                    self.view.insert(field.name, entry);
                }
            }
        }
    }

    fn initialize_collection(&mut self, name: &'static str, kind: &'static dyn DocumentKind) {
        let owner = self.owner.clone();
        let value = self.source.get(name).unwrap_or(&Value::Null);

        if let Some(ViewEntry::Collection(collection)) = self.view.get_mut(name)
            && collection.matches_source(value)
        {
            collection.relink(owner);
            return;
        }

        let collection = EmbeddedCollection::build(name, kind, value, owner);
        let synced = collection.to_source();
        if value.is_array() && *value != synced {
            // children without an id were assigned one
            self.source.insert(name.to_string(), synced);
        }
        self.view.insert(name, ViewEntry::Collection(collection));
    }

    fn initialize_singleton(&mut self, name: &'static str, kind: &'static dyn DocumentKind) {
        let owner = self.owner.clone();
        let Some(Value::Object(map)) = self.source.get(name) else {
            self.view.insert(name, ViewEntry::Singleton(None));
            return;
        };

        if let Some(ViewEntry::Singleton(Some(document))) = self.view.get_mut(name)
            && document.source() == map
        {
            document.relink(owner);
            return;
        }

        let entry = match Document::embedded(kind, map.clone(), owner, name, ModelOptions::lenient()) {
            Ok(document) => Some(Box::new(document)),
            Err(err) => {
                log::error!("{}.{name}: failed to initialize embedded document: {err}", self.kind.name());
                None
            }
        };
        self.view.insert(name, ViewEntry::Singleton(entry));
    }

    /// Point embedded children at a new owner identity.
    pub(crate) fn relink_children(&mut self, owner: Option<ParentLink>) {
        if self.owner == owner {
            return;
        }
        self.owner = owner;

        for entry in self.view.entries_mut() {
            match entry {
                ViewEntry::Collection(collection) => collection.relink(self.owner.clone()),
                ViewEntry::Singleton(Some(document)) => document.relink(self.owner.clone()),
                _ => {}
            }
        }
    }
}

impl fmt::Debug for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataModel")
            .field("kind", &self.kind.name())
            .field("source", &self.source)
            .field("invalid", &self.invalid())
            .finish()
    }
}

impl Serialize for DataModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}
