//! Schema field catalog.
//!
//! Fields form a closed set of kinds; every operation that special-cases a
//! kind (`clean`, `validate`, `initialize`, `migrate_source`, and the update
//! walk in `model`) matches over `FieldKind` exhaustively.

mod clean;
mod failure;
mod validate;


pub use clean::CleanOptions;
pub use failure::{ElementFailure, ValidationFailure};
pub use validate::ValidateContext;

use crate::{
    MAX_ID_LEN, Source,
    document::DocumentKind,
    model::{ModelKind, view::ViewEntry},
    schema::Schema,
};
use serde_json::{Map, Value, json};
use std::fmt;

///
/// Field
///
/// One named node of a schema.
///

#[derive(Clone, Debug)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub options: FieldOptions,
}

///
/// FieldKind
///

#[derive(Clone)]
pub enum FieldKind {
    Boolean,
    Number(NumberOptions),
    String(StringOptions),
    /// Document identity (`_id`); readonly once assigned.
    DocumentId,
    /// Free-form object, merged key by key on update.
    Object,
    Array(Box<Field>),
    Set(Box<Field>),
    /// Nested schema object.
    Schema(Schema),
    /// Object whose schema is chosen by a sibling discriminator field.
    TypeData(TypeDataField),
    EmbeddedCollection(&'static dyn DocumentKind),
    EmbeddedDocument(&'static dyn DocumentKind),
}

impl FieldKind {
    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::DocumentId => "document-id",
            Self::Object => "object",
            Self::Array(_) => "array",
            Self::Set(_) => "set",
            Self::Schema(_) => "schema",
            Self::TypeData(_) => "type-data",
            Self::EmbeddedCollection(_) => "embedded-collection",
            Self::EmbeddedDocument(_) => "embedded-document",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(options) => f.debug_tuple("Number").field(options).finish(),
            Self::String(options) => f.debug_tuple("String").field(options).finish(),
            Self::Array(element) => f.debug_tuple("Array").field(element).finish(),
            Self::Set(element) => f.debug_tuple("Set").field(element).finish(),
            Self::Schema(schema) => f.debug_tuple("Schema").field(schema).finish(),
            Self::TypeData(field) => f.debug_tuple("TypeData").field(field).finish(),
            Self::EmbeddedCollection(kind) => f
                .debug_tuple("EmbeddedCollection")
                .field(&kind.metadata().name)
                .finish(),
            Self::EmbeddedDocument(kind) => f
                .debug_tuple("EmbeddedDocument")
                .field(&kind.metadata().name)
                .finish(),
            other => f.write_str(other.label()),
        }
    }
}

///
/// NumberOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NumberOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integer: bool,
    pub positive: bool,
}

///
/// StringOptions
///

#[derive(Clone, Copy, Debug)]
pub struct StringOptions {
    pub blank: bool,
    pub trim: bool,
    pub choices: Option<&'static [&'static str]>,
}

impl Default for StringOptions {
    fn default() -> Self {
        Self {
            blank: true,
            trim: true,
            choices: None,
        }
    }
}

///
/// TypeDataField
///
/// Polymorphic object: the variant model is selected by the value of the
/// sibling `discriminator` field. Unknown discriminators leave the object
/// free-form.
///

#[derive(Clone, Copy)]
pub struct TypeDataField {
    pub discriminator: &'static str,
    pub variants: &'static [(&'static str, &'static dyn ModelKind)],
}

impl TypeDataField {
    /// Resolve the variant model for a discriminator value.
    #[must_use]
    pub fn variant(&self, type_name: Option<&str>) -> Option<&'static dyn ModelKind> {
        let type_name = type_name?;

        self.variants
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Debug for TypeDataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.variants.iter().map(|(name, _)| *name).collect();

        f.debug_struct("TypeDataField")
            .field("discriminator", &self.discriminator)
            .field("variants", &names)
            .finish()
    }
}

///
/// FieldOptions
///
/// `validator` runs after the kind's own type check.
/// `getter` turns the instance-side value into a computed property.
///

#[derive(Clone, Debug, Default)]
pub struct FieldOptions {
    pub required: bool,
    pub nullable: bool,
    pub readonly: bool,
    pub initial: Option<Value>,
    pub validator: Option<fn(&Value) -> Result<(), String>>,
    pub getter: Option<fn(&Source) -> Value>,
}

impl Field {
    // ======================================================================
    // Construction
    // ======================================================================

    #[must_use]
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            options: FieldOptions::default(),
        }
    }

    #[must_use]
    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean).initial(json!(false))
    }

    #[must_use]
    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldKind::Number(NumberOptions::default())).nullable()
    }

    #[must_use]
    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String(StringOptions::default()))
    }

    /// The `_id` field every document carries.
    #[must_use]
    pub fn document_id() -> Self {
        Self::new("_id", FieldKind::DocumentId).nullable().readonly()
    }

    #[must_use]
    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldKind::Object)
    }

    #[must_use]
    pub fn array(name: &'static str, element: Self) -> Self {
        Self::new(name, FieldKind::Array(Box::new(element)))
    }

    #[must_use]
    pub fn set(name: &'static str, element: Self) -> Self {
        Self::new(name, FieldKind::Set(Box::new(element)))
    }

    #[must_use]
    pub fn schema(name: &'static str, schema: Schema) -> Self {
        Self::new(name, FieldKind::Schema(schema))
    }

    #[must_use]
    pub fn type_data(
        name: &'static str,
        discriminator: &'static str,
        variants: &'static [(&'static str, &'static dyn ModelKind)],
    ) -> Self {
        Self::new(
            name,
            FieldKind::TypeData(TypeDataField {
                discriminator,
                variants,
            }),
        )
    }

    #[must_use]
    pub fn embedded_collection(name: &'static str, kind: &'static dyn DocumentKind) -> Self {
        Self::new(name, FieldKind::EmbeddedCollection(kind))
    }

    #[must_use]
    pub fn embedded_document(name: &'static str, kind: &'static dyn DocumentKind) -> Self {
        Self::new(name, FieldKind::EmbeddedDocument(kind)).nullable()
    }

    /// Per-user ownership map (`{"default": 0, "<user id>": level}`).
    #[must_use]
    pub fn ownership() -> Self {
        Self::object("ownership")
            .initial(json!({ "default": 0 }))
            .validator(validate_ownership)
    }

    /// Namespaced extension data (`flags.<scope>.<key>`).
    #[must_use]
    pub fn flags() -> Self {
        Self::object("flags")
    }

    /// Bookkeeping stamped by the persistence layer.
    #[must_use]
    pub fn document_stats() -> Self {
        Self::schema(
            "_stats",
            Schema::new([
                Self::number("createdTime"),
                Self::number("modifiedTime"),
                Self::string("lastModifiedBy").nullable(),
                Self::string("compendiumSource").nullable(),
            ]),
        )
    }

    // ======================================================================
    // Options
    // ======================================================================

    /// Mark the field as required. Required strings may not be blank and
    /// have no initial value.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.options.required = true;
        if let FieldKind::String(options) = &mut self.kind {
            options.blank = false;
        }

        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.options.nullable = true;
        self
    }

    #[must_use]
    pub const fn not_nullable(mut self) -> Self {
        self.options.nullable = false;
        self
    }

    #[must_use]
    pub const fn readonly(mut self) -> Self {
        self.options.readonly = true;
        self
    }

    #[must_use]
    pub fn initial(mut self, value: Value) -> Self {
        self.options.initial = Some(value);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: fn(&Value) -> Result<(), String>) -> Self {
        self.options.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn getter(mut self, getter: fn(&Source) -> Value) -> Self {
        self.options.getter = Some(getter);
        self
    }

    #[must_use]
    pub const fn integer(mut self) -> Self {
        if let FieldKind::Number(options) = &mut self.kind {
            options.integer = true;
        }
        self
    }

    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        if let FieldKind::Number(options) = &mut self.kind {
            options.min = Some(min);
        }
        self
    }

    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        if let FieldKind::Number(options) = &mut self.kind {
            options.max = Some(max);
        }
        self
    }

    #[must_use]
    pub const fn positive(mut self) -> Self {
        if let FieldKind::Number(options) = &mut self.kind {
            options.positive = true;
        }
        self
    }

    #[must_use]
    pub const fn blank(mut self, blank: bool) -> Self {
        if let FieldKind::String(options) = &mut self.kind {
            options.blank = blank;
        }
        self
    }

    #[must_use]
    pub const fn trim(mut self, trim: bool) -> Self {
        if let FieldKind::String(options) = &mut self.kind {
            options.trim = trim;
        }
        self
    }

    #[must_use]
    pub const fn choices(mut self, choices: &'static [&'static str]) -> Self {
        if let FieldKind::String(options) = &mut self.kind {
            options.choices = Some(choices);
        }
        self
    }

    // ======================================================================
    // Introspection
    // ======================================================================

    /// Embedded collections and singletons: initialized last, owned by a
    /// document, and updated through their own children.
    #[must_use]
    pub const fn is_hierarchical(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::EmbeddedCollection(_) | FieldKind::EmbeddedDocument(_)
        )
    }

    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        self.options.readonly || matches!(self.kind, FieldKind::DocumentId)
    }

    /// The initial value used when a record omits this field.
    #[must_use]
    pub fn initial_value(&self, siblings: Option<&Source>) -> Value {
        if let Some(initial) = &self.options.initial {
            return initial.clone();
        }
        if self.options.nullable {
            return Value::Null;
        }

        match &self.kind {
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::String(options) if options.blank => Value::String(String::new()),
            FieldKind::Number(_)
            | FieldKind::String(_)
            | FieldKind::DocumentId
            | FieldKind::EmbeddedDocument(_) => Value::Null,
            FieldKind::Object => Value::Object(Map::new()),
            FieldKind::Array(_) | FieldKind::Set(_) | FieldKind::EmbeddedCollection(_) => {
                Value::Array(Vec::new())
            }
            FieldKind::Schema(schema) => {
                Value::Object(schema.clean(Map::new(), &CleanOptions::default()))
            }
            FieldKind::TypeData(field) => {
                let type_name = siblings
                    .and_then(|s| s.get(field.discriminator))
                    .and_then(Value::as_str);
                match field.variant(type_name) {
                    Some(variant) => Value::Object(
                        variant
                            .schema()
                            .clean(Map::new(), &CleanOptions::default()),
                    ),
                    None => Value::Object(Map::new()),
                }
            }
        }
    }

    // ======================================================================
    // Initialization
    // ======================================================================

    /// Produce the instance-side entry for a non-hierarchical field.
    #[must_use]
    pub fn initialize(&self, value: &Value) -> ViewEntry {
        if let Some(getter) = self.options.getter {
            ViewEntry::Getter(getter)
        } else if self.is_readonly() {
            ViewEntry::Readonly(value.clone())
        } else {
            ViewEntry::Value(value.clone())
        }
    }

    // ======================================================================
    // Migration
    // ======================================================================

    /// Rewrite legacy shapes of this field's value in place.
    pub fn migrate_source(&self, value: &mut Value, type_name: Option<&str>) {
        match (&self.kind, value) {
            (FieldKind::Schema(schema), Value::Object(map)) => schema.migrate_source(map),
            (FieldKind::TypeData(field), Value::Object(map)) => {
                if let Some(variant) = field.variant(type_name) {
                    variant.migrate_data_safe(map);
                }
            }
            (FieldKind::EmbeddedCollection(kind), Value::Array(items)) => {
                for item in items {
                    if let Value::Object(map) = item {
                        kind.migrate_data_safe(map);
                    }
                }
            }
            (FieldKind::EmbeddedDocument(kind), Value::Object(map)) => kind.migrate_data_safe(map),
            (FieldKind::Array(element) | FieldKind::Set(element), Value::Array(items)) => {
                for item in items {
                    element.migrate_source(item, None);
                }
            }
            _ => {}
        }
    }

    // ======================================================================
    // Joint validation
    // ======================================================================

    /// Run the joint validators of models nested in this field.
    ///
    /// Embedded collection children are joint-validated when they are built,
    /// so invalid children can be isolated instead of failing the parent.
    pub fn validate_joint(&self, value: &Value, type_name: Option<&str>) -> Result<(), String> {
        match (&self.kind, value) {
            (FieldKind::Schema(schema), Value::Object(map)) => schema.validate_joint(map),
            (FieldKind::TypeData(field), Value::Object(map)) => match field.variant(type_name) {
                Some(variant) => variant.validate_model_joint(map),
                None => Ok(()),
            },
            (FieldKind::EmbeddedDocument(kind), Value::Object(map)) => kind.validate_model_joint(map),
            _ => Ok(()),
        }
        .map_err(|message| format!("{}: {message}", self.name))
    }
}

/// True when `id` is a well-formed document identifier.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())
}

// Ownership maps hold integer levels keyed by user id or "default".
fn validate_ownership(value: &Value) -> Result<(), String> {
    let Value::Object(map) = value else {
        return Err("must be an object".to_string());
    };

    for (key, level) in map {
        let valid = level
            .as_i64()
            .is_some_and(|level| (-1..=3).contains(&level));
        if !valid {
            return Err(format!("ownership level for '{key}' must be an integer from -1 to 3"));
        }
    }

    Ok(())
}
