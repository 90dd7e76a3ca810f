use crate::{
    Source,
    document::DocumentKind,
    field::{
        ElementFailure, Field, FieldKind, NumberOptions, StringOptions, ValidationFailure,
        is_valid_id,
    },
    patch::deletion_target,
};
use serde_json::Value;

///
/// ValidateContext
///
/// Options threaded through a validation walk.
///
/// `partial` validates a change set (absent keys are not checked).
/// `fallback` lets invalid values be replaced by the field's initial value,
/// and invalid array elements be dropped.
/// `source` is the record the validated value belongs to.
/// `type_name` is the resolved discriminator for a type-data field.
///

#[derive(Clone, Debug, Default)]
pub struct ValidateContext<'a> {
    pub partial: bool,
    pub fallback: bool,
    pub drop_invalid_embedded: bool,
    pub source: Option<&'a Source>,
    pub type_name: Option<String>,
}

impl<'a> ValidateContext<'a> {
    // context for a record nested under `name`
    fn nested(&self, name: &str) -> ValidateContext<'a> {
        ValidateContext {
            partial: self.partial,
            fallback: self.fallback,
            drop_invalid_embedded: self.drop_invalid_embedded,
            source: self
                .source
                .and_then(|source| source.get(name))
                .and_then(Value::as_object),
            type_name: None,
        }
    }

    // context for an independent record (array element, embedded child)
    fn detached(&self) -> ValidateContext<'a> {
        ValidateContext {
            partial: self.partial,
            fallback: self.fallback,
            drop_invalid_embedded: self.drop_invalid_embedded,
            source: None,
            type_name: None,
        }
    }
}

impl Field {
    /// Validate a cleaned value, possibly repairing it in place when
    /// `fallback` is enabled. Returns `None` when the value is acceptable.
    pub fn validate(&self, value: &mut Value, ctx: &ValidateContext<'_>) -> Option<ValidationFailure> {
        let failure = self.validate_value(value, ctx)?;
        if !ctx.fallback || !failure.is_unresolved() {
            return Some(failure);
        }

        let fallback = self.initial_value(None);
        let mut candidate = fallback.clone();
        let strict = ValidateContext {
            fallback: false,
            ..ctx.clone()
        };
        if self.validate_value(&mut candidate, &strict).is_none() {
            *value = candidate;
            return Some(failure.resolved_with(fallback));
        }

        Some(failure)
    }

    fn validate_value(&self, value: &mut Value, ctx: &ValidateContext<'_>) -> Option<ValidationFailure> {
        if value.is_null() {
            if self.options.nullable {
                return None;
            }
            let message = if self.options.required {
                "is required"
            } else {
                "may not be null"
            };

            return Some(ValidationFailure::new(value, message));
        }

        if let Some(failure) = self.validate_type(value, ctx) {
            return Some(failure);
        }

        let validator = self.options.validator?;
        validator(value)
            .err()
            .map(|message| ValidationFailure::new(value, message))
    }

    fn validate_type(&self, value: &mut Value, ctx: &ValidateContext<'_>) -> Option<ValidationFailure> {
        match &self.kind {
            FieldKind::Boolean => {
                (!value.is_boolean()).then(|| ValidationFailure::new(value, "must be a boolean"))
            }
            FieldKind::Number(options) => validate_number(value, *options),
            FieldKind::String(options) => validate_string(value, *options),
            FieldKind::DocumentId => match value.as_str() {
                Some(id) if is_valid_id(id) => None,
                _ => Some(ValidationFailure::new(value, "must be a valid document id")),
            },
            FieldKind::Object => {
                (!value.is_object()).then(|| ValidationFailure::new(value, "must be an object"))
            }
            FieldKind::Array(element) => validate_elements(element, value, ctx, false),
            FieldKind::Set(element) => validate_elements(element, value, ctx, true),
            FieldKind::Schema(schema) => match value {
                Value::Object(map) => schema.validate(map, &ctx.nested(self.name)),
                other => Some(ValidationFailure::new(other, "must be an object")),
            },
            FieldKind::TypeData(field) => match value {
                Value::Object(map) => field
                    .variant(ctx.type_name.as_deref())
                    .and_then(|variant| variant.schema().validate(map, &ctx.nested(self.name))),
                other => Some(ValidationFailure::new(other, "must be an object")),
            },
            FieldKind::EmbeddedCollection(kind) => validate_collection(*kind, value, ctx),
            FieldKind::EmbeddedDocument(kind) => match value {
                Value::Object(map) => kind.schema().validate(map, &ctx.detached()),
                other => Some(ValidationFailure::new(other, "must be an object")),
            },
        }
    }
}

fn validate_number(value: &Value, options: NumberOptions) -> Option<ValidationFailure> {
    let Some(number) = value.as_f64() else {
        return Some(ValidationFailure::new(value, "must be a number"));
    };

    let message = if options.integer && number.fract() != 0.0 {
        "must be an integer".to_string()
    } else if let Some(min) = options.min
        && number < min
    {
        format!("must be greater than or equal to {min}")
    } else if let Some(max) = options.max
        && number > max
    {
        format!("must be less than or equal to {max}")
    } else if options.positive && number <= 0.0 {
        "must be a positive number".to_string()
    } else {
        return None;
    };

    Some(ValidationFailure::new(value, message))
}

fn validate_string(value: &Value, options: StringOptions) -> Option<ValidationFailure> {
    let Some(text) = value.as_str() else {
        return Some(ValidationFailure::new(value, "must be a string"));
    };

    if !options.blank && text.trim().is_empty() {
        return Some(ValidationFailure::new(value, "may not be a blank string"));
    }
    if let Some(choices) = options.choices
        && !choices.contains(&text)
    {
        return Some(ValidationFailure::new(
            value,
            format!("{text} is not a valid choice"),
        ));
    }

    None
}

// With fallback, invalid elements are dropped rather than repaired.
fn validate_elements(
    element: &Field,
    value: &mut Value,
    ctx: &ValidateContext<'_>,
    unique: bool,
) -> Option<ValidationFailure> {
    let Value::Array(items) = value else {
        return Some(ValidationFailure::new(value, "must be an array"));
    };

    let element_ctx = ValidateContext {
        fallback: false,
        ..ctx.detached()
    };
    let mut failure = ValidationFailure::default();
    let mut kept = Vec::with_capacity(items.len());

    for (index, mut item) in std::mem::take(items).into_iter().enumerate() {
        match element.validate(&mut item, &element_ctx) {
            None => kept.push(item),
            Some(inner) => {
                let dropped = ctx.fallback;
                failure.elements.push(ElementFailure {
                    id: index.to_string(),
                    name: None,
                    failure: if dropped { inner.dropped() } else { inner },
                });
                if !dropped {
                    kept.push(item);
                }
            }
        }
    }
    *items = kept;

    if unique {
        for (index, item) in items.iter().enumerate() {
            if items[..index].contains(item) {
                failure.elements.push(ElementFailure {
                    id: index.to_string(),
                    name: None,
                    failure: ValidationFailure::new(item, "may not contain duplicate values"),
                });
            }
        }
    }

    (!failure.elements.is_empty()).then_some(failure)
}

// Children are keyed by `_id` in the failure tree.
fn validate_collection(
    kind: &dyn DocumentKind,
    value: &mut Value,
    ctx: &ValidateContext<'_>,
) -> Option<ValidationFailure> {
    let child_ctx = ctx.detached();
    let mut failure = ValidationFailure::default();

    match value {
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                let id = item
                    .get("_id")
                    .and_then(Value::as_str)
                    .map_or_else(|| index.to_string(), str::to_string);
                failure
                    .elements
                    .extend(validate_child(kind, id, item, &child_ctx));
            }
        }
        Value::Object(entries) if ctx.partial => {
            for (key, item) in entries.iter_mut() {
                if deletion_target(key).is_none() {
                    failure
                        .elements
                        .extend(validate_child(kind, key.clone(), item, &child_ctx));
                }
            }
        }
        other => return Some(ValidationFailure::new(other, "must be an array")),
    }

    // invalid children are isolated when the collection is built
    if failure.elements.is_empty() || ctx.drop_invalid_embedded {
        None
    } else {
        Some(failure)
    }
}

fn validate_child(
    kind: &dyn DocumentKind,
    id: String,
    item: &mut Value,
    ctx: &ValidateContext<'_>,
) -> Option<ElementFailure> {
    let Value::Object(map) = item else {
        return Some(ElementFailure {
            id,
            name: None,
            failure: ValidationFailure::new(item, "must be an object"),
        });
    };

    let name = map.get("name").and_then(Value::as_str).map(str::to_string);
    let mut failure = kind.schema().validate(map, ctx)?;
    failure.message = Some(format!(
        "{} [{id}] validation errors",
        kind.metadata().name
    ));

    Some(ElementFailure { id, name, failure })
}
