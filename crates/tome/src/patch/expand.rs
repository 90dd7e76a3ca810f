use crate::patch::{PatchError, error::kind_label};
use serde_json::{Map, Value};

/// Expand dotted keys into nested objects, recursively.
///
/// `{"hp.value": 3}` becomes `{"hp": {"value": 3}}`. When two keys address
/// the same object (`"hp"` and `"hp.max"`) the objects are merged.
pub fn expand_object(value: Value) -> Result<Value, PatchError> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let inner = expand_object(inner).map_err(|err| err.under(&key))?;
                insert_path(&mut out, &key, inner)?;
            }

            Ok(Value::Object(out))
        }

        Value::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for (index, inner) in values.into_iter().enumerate() {
                out.push(expand_object(inner).map_err(|err| err.under(&index.to_string()))?);
            }

            Ok(Value::Array(out))
        }

        other => Ok(other),
    }
}

// Insert a value at a dotted path, creating intermediate objects.
fn insert_path(target: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), PatchError> {
    let mut segments = key.split('.').enumerate().peekable();
    let mut current = target;

    while let Some((depth, segment)) = segments.next() {
        if segment.is_empty() {
            return Err(PatchError::EmptySegment {
                key: key.to_string(),
            });
        }

        if segments.peek().is_none() {
            match (current.get_mut(segment), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k, v);
                    }
                }
                (_, value) => {
                    current.insert(segment.to_string(), value);
                }
            }

            return Ok(());
        }

        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        current = match next {
            Value::Object(map) => map,
            other => {
                return Err(PatchError::InvalidShape {
                    key: key.to_string(),
                    blocked: key.split('.').take(depth + 1).collect::<Vec<_>>().join("."),
                    found: kind_label(other),
                });
            }
        };
    }

    Ok(())
}

/// Read a value at a dotted path.
#[must_use]
pub fn get_property<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(values) => segment.parse::<usize>().ok().and_then(|i| values.get(i)),
        _ => None,
    })
}

/// True when a value exists at a dotted path.
#[must_use]
pub fn has_property(value: &Value, path: &str) -> bool {
    get_property(value, path).is_some()
}
