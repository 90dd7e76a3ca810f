use crate::{
    Source,
    document::DocumentKind,
    field::{Field, FieldKind, StringOptions},
    patch::deletion_target,
};
use serde_json::{Map, Number, Value};

///
/// CleanOptions
///
/// `partial` cleans a change set: keys absent from the input stay absent.
/// `source` is the record the input belongs to (or will be applied to); it is
/// consulted for discriminators the input does not carry.
/// `siblings` holds the already-cleaned keys of the record being cleaned.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct CleanOptions<'a> {
    pub partial: bool,
    pub source: Option<&'a Source>,
    pub siblings: Option<&'a Source>,
}

impl<'a> CleanOptions<'a> {
    #[must_use]
    pub const fn partial(source: Option<&'a Source>) -> Self {
        Self {
            partial: true,
            source,
            siblings: None,
        }
    }

    /// Resolve a discriminator, preferring the record being cleaned.
    #[must_use]
    pub fn type_name(&self, discriminator: &str) -> Option<&'a str> {
        self.siblings
            .and_then(|siblings| siblings.get(discriminator))
            .or_else(|| self.source.and_then(|source| source.get(discriminator)))
            .and_then(Value::as_str)
    }

    // options for a record nested under `name`
    fn nested(&self, name: &str) -> CleanOptions<'a> {
        CleanOptions {
            partial: self.partial,
            source: self
                .source
                .and_then(|source| source.get(name))
                .and_then(Value::as_object),
            siblings: None,
        }
    }
}

impl Field {
    /// Coerce a raw value into this field's canonical shape.
    ///
    /// Absent values take the initial value; `null` is kept for nullable
    /// fields and replaced by the initial value otherwise. Values that cannot
    /// be cast are returned unchanged for validation to reject.
    #[must_use]
    pub fn clean(&self, value: Option<Value>, options: &CleanOptions<'_>) -> Value {
        let siblings = options.siblings.or(options.source);

        match value {
            None => self.initial_value(siblings),
            Some(Value::Null) if self.options.nullable => Value::Null,
            Some(Value::Null) => self.initial_value(siblings),
            Some(value) => self.clean_type(value, options),
        }
    }

    fn clean_type(&self, value: Value, options: &CleanOptions<'_>) -> Value {
        match &self.kind {
            FieldKind::Boolean => cast_boolean(value),
            FieldKind::Number(_) => cast_number(value),
            FieldKind::String(string) => cast_string(value, *string),
            FieldKind::DocumentId => cast_id(value),
            FieldKind::Object => value,
            FieldKind::Array(element) => Value::Array(clean_elements(element, value, options)),
            FieldKind::Set(element) => {
                let mut unique = Vec::new();
                for item in clean_elements(element, value, options) {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }

                Value::Array(unique)
            }
            FieldKind::Schema(schema) => {
                Value::Object(schema.clean(into_object(value), &options.nested(self.name)))
            }
            FieldKind::TypeData(field) => {
                let map = into_object(value);
                match field.variant(options.type_name(field.discriminator)) {
                    Some(variant) => {
                        Value::Object(variant.schema().clean(map, &options.nested(self.name)))
                    }
                    None => Value::Object(map),
                }
            }
            FieldKind::EmbeddedCollection(kind) => clean_collection(*kind, value, options.partial),
            FieldKind::EmbeddedDocument(kind) => match value {
                Value::Object(map) => Value::Object(clean_child(*kind, map, options.partial)),
                other => other,
            },
        }
    }
}

/// Normalize a number: integral values are stored as integers.
#[must_use]
pub(crate) fn normalize_number(number: f64) -> Value {
    const SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if number.fract() == 0.0 && number.abs() <= SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        return Value::from(number as i64);
    }

    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

fn cast_boolean(value: Value) -> Value {
    match value {
        Value::String(text) => match text.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text),
        },
        Value::Number(number) => Value::Bool(number.as_f64().is_some_and(|n| n != 0.0)),
        other => other,
    }
}

fn cast_number(value: Value) -> Value {
    match value {
        Value::Number(number) => {
            if number.is_i64() {
                Value::Number(number)
            } else {
                number
                    .as_f64()
                    .map_or(Value::Number(number), normalize_number)
            }
        }
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => normalize_number(number),
            _ => Value::String(text),
        },
        Value::Bool(flag) => Value::from(i64::from(flag)),
        other => other,
    }
}

fn cast_string(value: Value, options: StringOptions) -> Value {
    match value {
        Value::String(text) if options.trim => Value::String(text.trim().to_string()),
        Value::Number(number) => Value::String(number.to_string()),
        Value::Bool(flag) => Value::String(flag.to_string()),
        other => other,
    }
}

fn cast_id(value: Value) -> Value {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other,
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// Arrays clean each element; a lone value becomes a one-element array.
fn clean_elements(element: &Field, value: Value, options: &CleanOptions<'_>) -> Vec<Value> {
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    let options = CleanOptions {
        partial: false,
        source: None,
        siblings: None,
    };

    items
        .into_iter()
        .map(|item| element.clean(Some(item), &options))
        .collect()
}

fn clean_child(kind: &dyn DocumentKind, map: Map<String, Value>, partial: bool) -> Map<String, Value> {
    let options = CleanOptions {
        partial,
        source: None,
        siblings: None,
    };

    kind.schema().clean(map, &options)
}

// Collections accept an array of child records, or (in change sets) a map
// keyed by child id with "-=id" deletion markers.
fn clean_collection(kind: &dyn DocumentKind, value: Value, partial: bool) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(clean_child(kind, map, partial)),
                    other => other,
                })
                .collect(),
        ),
        Value::Object(entries) if partial => Value::Object(
            entries
                .into_iter()
                .map(|(key, item)| {
                    if deletion_target(&key).is_some() {
                        return (key, Value::Null);
                    }
                    let item = match item {
                        Value::Object(mut map) => {
                            map.insert("_id".to_string(), Value::String(key.clone()));
                            Value::Object(clean_child(kind, map, partial))
                        }
                        other => other,
                    };

                    (key, item)
                })
                .collect(),
        ),
        Value::Object(map) => Value::Array(vec![Value::Object(clean_child(kind, map, partial))]),
        other => other,
    }
}
