use crate::{
    Source,
    document::{Document, DocumentKind, ParentLink},
    field::{CleanOptions, FieldKind},
    model::{
        DataModel, ModelError, ModelOptions, ValidateOptions,
        view::{InstanceView, ViewEntry},
    },
    patch::{MergeOptions, diff_object, merge_object},
    schema::Schema,
};
use serde_json::Value;
use std::collections::BTreeMap;

///
/// UpdateOptions
///
/// `dry_run` computes and validates the diff, then restores the model.
/// `recursive` merges objects key by key; when false, objects are replaced
/// and embedded collections drop children missing from an array update.
///

#[derive(Clone, Copy, Debug)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub fallback: bool,
    pub recursive: bool,
}

impl UpdateOptions {
    #[must_use]
    pub const fn dry_run() -> Self {
        Self {
            dry_run: true,
            fallback: false,
            recursive: true,
        }
    }

    #[must_use]
    pub const fn replace() -> Self {
        Self {
            dry_run: false,
            fallback: false,
            recursive: false,
        }
    }

    // embedded children always apply for real; the owner restores them
    pub(crate) const fn nested(self) -> Self {
        Self {
            dry_run: false,
            ..self
        }
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            fallback: false,
            recursive: true,
        }
    }
}

///
/// Backup
///
/// Prior state of every top-level key touched by an update.
///

#[derive(Default)]
struct Backup {
    source: Vec<(String, Option<Value>)>,
    entries: Vec<(&'static str, Option<ViewEntry>)>,
}

impl DataModel {
    /// Apply a change set atomically and return the minimal diff.
    ///
    /// Dotted keys are expanded and the changes are cleaned and validated
    /// before anything is applied. Any failure while applying or during
    /// post-validation restores the model to its exact prior state.
    pub fn update_source(&mut self, changes: Value, options: UpdateOptions) -> Result<Source, ModelError> {
        let diff = self.apply_update(changes, options)?;
        if !options.dry_run {
            self.initialize_view();
        }

        Ok(diff)
    }

    /// `update_source` without re-initializing the instance view.
    pub(crate) fn apply_update(&mut self, changes: Value, options: UpdateOptions) -> Result<Source, ModelError> {
        let was_invalid = self.invalid();
        let prior_failures = self.failures.clone();
        let changes = self.validate_changes(changes, options.fallback)?;

        let mut backup = Backup::default();
        let outcome = self
            .apply_changes(changes, options, &mut backup)
            .and_then(|diff| {
                self.validate(ValidateOptions {
                    fields: was_invalid,
                    joint: Some(true),
                    ..ValidateOptions::default()
                })?;
                Ok(diff)
            });

        match outcome {
            Ok(diff) if !options.dry_run => Ok(diff),
            outcome => {
                self.restore(backup);
                self.failures = prior_failures;
                outcome
            }
        }
    }

    fn apply_changes(
        &mut self,
        changes: Source,
        options: UpdateOptions,
        backup: &mut Backup,
    ) -> Result<Source, ModelError> {
        let schema = self.schema();

        for (name, value) in &changes {
            let Some(field) = schema.get(name) else {
                continue;
            };
            if self.source.get(name) == Some(value) {
                continue;
            }
            backup.source.push((name.clone(), self.source.get(name).cloned()));
            if field.is_hierarchical() {
                backup
                    .entries
                    .push((field.name, self.view.get(field.name).cloned()));
            }
        }

        update_record(
            self.kind.name(),
            schema,
            &mut self.source,
            changes,
            options,
            Some(&mut self.view),
            self.owner.as_ref(),
        )
    }

    fn restore(&mut self, backup: Backup) {
        for (name, value) in backup.source {
            match value {
                Some(value) => self.source.insert(name, value),
                None => self.source.remove(&name),
            };
        }
        for (name, entry) in backup.entries {
            match entry {
                Some(entry) => self.view.insert(name, entry),
                None => self.view.remove(name),
            }
        }
    }
}

// Apply cleaned changes to one record and collect the diff. Only the top
// level carries a live view; nested records hold plain data.
fn update_record(
    model: &'static str,
    schema: &Schema,
    current: &mut Source,
    changes: Source,
    options: UpdateOptions,
    mut view: Option<&mut InstanceView>,
    owner: Option<&ParentLink>,
) -> Result<Source, ModelError> {
    let type_names = discriminators(schema, current, &changes);
    let mut diff = Source::new();

    for (name, value) in changes {
        let Some(field) = schema.get(&name) else {
            continue;
        };
        if current.get(&name) == Some(&value) {
            continue;
        }
        if field.is_readonly() && current.get(&name).is_some_and(|prior| !prior.is_null()) {
            return Err(ModelError::Readonly { model, field: name });
        }

        let change = match &field.kind {
            FieldKind::EmbeddedCollection(_) => {
                match view.as_deref_mut().and_then(|v| v.collection_mut(field.name)) {
                    Some(collection) => {
                        let inner = collection.update(value, options.nested())?;
                        current.insert(name.clone(), collection.to_source());
                        non_empty(inner)
                    }
                    None => assign(current, &name, value),
                }
            }

            FieldKind::EmbeddedDocument(kind) => match view.as_deref_mut() {
                Some(view) => update_singleton(view, current, field.name, *kind, value, owner, options)?,
                None => assign(current, &name, value),
            },

            FieldKind::Schema(inner) => match (current.get_mut(&name), value) {
                (Some(Value::Object(existing)), Value::Object(nested)) => non_empty(update_record(
                    model, inner, existing, nested, options, None, None,
                )?),
                (_, value) => assign(current, &name, value),
            },

            FieldKind::TypeData(typed) => {
                let (type_name, switched) = type_names.get(field.name).cloned().unwrap_or_default();
                let variant = typed.variant(type_name.as_deref());

                match (variant, current.get_mut(&name), value) {
                    // a new type replaces the whole object with the new variant's shape
                    (Some(variant), _, Value::Object(nested)) if switched => {
                        let cleaned = variant.schema().clean(nested, &CleanOptions::default());
                        assign(current, &name, Value::Object(cleaned))
                    }
                    (Some(variant), Some(Value::Object(existing)), Value::Object(nested)) => {
                        non_empty(update_record(
                            model,
                            variant.schema(),
                            existing,
                            nested,
                            options,
                            None,
                            None,
                        )?)
                    }
                    (None, Some(Value::Object(existing)), Value::Object(nested)) if options.recursive => {
                        merge_free(existing, nested)
                    }
                    (_, _, value) => assign(current, &name, value),
                }
            }

            FieldKind::Object if options.recursive => match (current.get_mut(&name), value) {
                (Some(Value::Object(existing)), Value::Object(nested)) => merge_free(existing, nested),
                (_, value) => assign(current, &name, value),
            },

            _ => assign(current, &name, value),
        };

        if let Some(change) = change {
            diff.insert(name, change);
        }
    }

    Ok(diff)
}

// A live child takes the change as its own update. Without one, the change
// must construct a complete child on its own.
fn update_singleton(
    view: &mut InstanceView,
    current: &mut Source,
    field: &'static str,
    kind: &'static dyn DocumentKind,
    value: Value,
    owner: Option<&ParentLink>,
    options: UpdateOptions,
) -> Result<Option<Value>, ModelError> {
    let Value::Object(changes) = value else {
        return Ok(assign(current, field, value));
    };

    if let Some(child) = view.singleton_mut(field) {
        let inner = child
            .update_source(Value::Object(changes), options.nested())
            .map_err(|err| ModelError::Embedded {
                field,
                id: child.id().unwrap_or_default().to_string(),
                source: Box::new(err),
            })?;
        current.insert(field.to_string(), Value::Object(child.source().clone()));

        return Ok(non_empty(inner));
    }

    let id = changes
        .get("_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let child = Document::embedded(kind, changes, owner.cloned(), field, ModelOptions::default())
        .map_err(|err| ModelError::Embedded {
            field,
            id,
            source: Box::new(err),
        })?;
    let source = child.source().clone();
    current.insert(field.to_string(), Value::Object(source.clone()));
    view.insert(field, ViewEntry::Singleton(Some(Box::new(child))));

    Ok(Some(Value::Object(source)))
}

// (discriminator value, whether the change set switches it) per type-data field
fn discriminators(
    schema: &Schema,
    current: &Source,
    changes: &Source,
) -> BTreeMap<&'static str, (Option<String>, bool)> {
    schema
        .iter()
        .filter_map(|field| {
            let FieldKind::TypeData(typed) = &field.kind else {
                return None;
            };
            let prior = current.get(typed.discriminator).and_then(Value::as_str);
            let next = changes.get(typed.discriminator).and_then(Value::as_str);
            let switched = next.is_some() && next != prior;

            Some((field.name, (next.or(prior).map(str::to_string), switched)))
        })
        .collect()
}

fn assign(current: &mut Source, name: &str, value: Value) -> Option<Value> {
    current.insert(name.to_string(), value.clone());
    Some(value)
}

// free-form objects merge in place; deletion markers are honoured
fn merge_free(existing: &mut Source, incoming: Source) -> Option<Value> {
    let diff = diff_object(existing, &incoming);
    merge_object(existing, incoming, MergeOptions::update());

    non_empty(diff)
}

fn non_empty(diff: Source) -> Option<Value> {
    (!diff.is_empty()).then_some(Value::Object(diff))
}
