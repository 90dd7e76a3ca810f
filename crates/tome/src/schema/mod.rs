//! Ordered field collections and the per-model schema registry.

mod registry;


pub use registry::schema_for;

use crate::{
    Source,
    field::{CleanOptions, Field, FieldKind, ValidateContext, ValidationFailure},
};
use serde_json::Value;

///
/// Schema
///
/// Ordered set of uniquely named fields. Legacy names can be registered as
/// shims that resolve to a current field name on read.
///

#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<Field>,
    shims: Vec<Shim>,
}

///
/// Shim
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Shim {
    pub legacy: &'static str,
    pub current: &'static str,
}

impl Schema {
    /// Build a schema. Later fields reusing an existing name are ignored.
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut schema = Self::default();
        for field in fields {
            if schema.has(field.name) {
                log::warn!("schema field '{}' is defined twice; keeping the first", field.name);
                continue;
            }
            schema.fields.push(field);
        }

        schema
    }

    /// Register a legacy field name.
    #[must_use]
    pub fn shim(mut self, legacy: &'static str, current: &'static str) -> Self {
        self.push_shim(legacy, current);
        self
    }

    pub(crate) fn push_shim(&mut self, legacy: &'static str, current: &'static str) {
        if !self.shims.iter().any(|shim| shim.legacy == legacy) {
            self.shims.push(Shim { legacy, current });
        }
    }

    // ======================================================================
    // Lookup
    // ======================================================================

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn shims(&self) -> &[Shim] {
        &self.shims
    }

    /// Embedded collections and singletons, in declaration order.
    pub fn hierarchical(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.is_hierarchical())
    }

    /// Fields in initialization order: plain fields first, then
    /// hierarchical ones, each group in declaration order.
    pub fn initialization_order(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|field| !field.is_hierarchical())
            .chain(self.hierarchical())
    }

    /// Map a legacy name to its current name.
    #[must_use]
    pub fn resolve_shim(&self, name: &str) -> Option<&'static str> {
        self.shims
            .iter()
            .find(|shim| shim.legacy == name)
            .map(|shim| shim.current)
    }

    /// Rewrite a dotted path, replacing legacy segments with current names
    /// wherever a nested schema is known.
    #[must_use]
    pub fn canonical_path(&self, path: &str) -> String {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let head = if self.has(head) {
            head
        } else {
            self.resolve_shim(head).unwrap_or(head)
        };

        let Some(rest) = rest else {
            return head.to_string();
        };
        let rest = match self.get(head).map(|field| &field.kind) {
            Some(FieldKind::Schema(inner)) => inner.canonical_path(rest),
            Some(FieldKind::EmbeddedDocument(kind)) => kind.schema().canonical_path(rest),
            _ => rest.to_string(),
        };

        format!("{head}.{rest}")
    }

    // ======================================================================
    // Data
    // ======================================================================

    /// Clean a record: known fields are cast and defaulted, unknown keys are
    /// dropped. Discriminated fields are cleaned after their siblings.
    #[must_use]
    pub fn clean(&self, mut data: Source, options: &CleanOptions<'_>) -> Source {
        let (typed, plain): (Vec<&Field>, Vec<&Field>) = self
            .fields
            .iter()
            .partition(|field| matches!(field.kind, FieldKind::TypeData(_)));

        let mut out = Source::new();
        for field in plain.into_iter().chain(typed) {
            let raw = data.remove(field.name);
            if raw.is_none() && options.partial {
                continue;
            }
            let cleaned = field.clean(
                raw,
                &CleanOptions {
                    partial: options.partial,
                    source: options.source,
                    siblings: Some(&out),
                },
            );
            out.insert(field.name.to_string(), cleaned);
        }

        out
    }

    /// A fully initialized record with every field at its initial value.
    #[must_use]
    pub fn initial_source(&self) -> Source {
        self.clean(Source::new(), &CleanOptions::default())
    }

    /// Validate a cleaned record field by field.
    pub fn validate(&self, data: &mut Source, ctx: &ValidateContext<'_>) -> Option<ValidationFailure> {
        let mut failure = ValidationFailure::default();

        for field in &self.fields {
            let field_ctx = ValidateContext {
                type_name: discriminator(field, data, ctx.source).map(str::to_string),
                ..ctx.clone()
            };

            let outcome = match data.get_mut(field.name) {
                Some(value) => field.validate(value, &field_ctx),
                None if ctx.partial => None,
                None => {
                    let mut value = Value::Null;
                    let outcome = field.validate(&mut value, &field_ctx);
                    if outcome.as_ref().is_some_and(|f| f.fallback.is_some()) {
                        data.insert(field.name.to_string(), value);
                    }
                    outcome
                }
            };

            if let Some(inner) = outcome {
                failure.fields.insert(field.name.to_string(), inner);
            }
        }

        (!failure.fields.is_empty()).then_some(failure)
    }

    /// Apply nested model migrations in place.
    pub fn migrate_source(&self, data: &mut Source) {
        for field in &self.fields {
            let type_name = discriminator(field, data, None).map(str::to_string);
            if let Some(value) = data.get_mut(field.name) {
                field.migrate_source(value, type_name.as_deref());
            }
        }
    }

    /// Run joint validators of nested models.
    pub fn validate_joint(&self, data: &Source) -> Result<(), String> {
        for field in &self.fields {
            if let Some(value) = data.get(field.name) {
                field.validate_joint(value, discriminator(field, data, None))?;
            }
        }

        Ok(())
    }
}

// discriminator value for a type-data field, looked up in the record first
fn discriminator<'a>(field: &Field, data: &'a Source, fallback: Option<&'a Source>) -> Option<&'a str> {
    let FieldKind::TypeData(typed) = &field.kind else {
        return None;
    };

    data.get(typed.discriminator)
        .or_else(|| fallback.and_then(|source| source.get(typed.discriminator)))
        .and_then(Value::as_str)
}
