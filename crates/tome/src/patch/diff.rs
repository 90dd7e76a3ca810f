use crate::patch::deletion_target;
use serde_json::{Map, Value};

/// Compute the minimal difference that turns `original` into `other`.
///
/// Only keys of `other` are considered. Nested objects are diffed key by
/// key; every other value (arrays included) is compared by value. A
/// deletion marker survives only when the key it targets exists.
#[must_use]
pub fn diff_object(original: &Map<String, Value>, other: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, next) in other {
        if let Some(target) = deletion_target(key) {
            if original.contains_key(target) {
                out.insert(key.clone(), next.clone());
            }
            continue;
        }

        match original.get(key) {
            None => {
                out.insert(key.clone(), next.clone());
            }
            Some(prior) => {
                if let Some(difference) = difference(prior, next) {
                    out.insert(key.clone(), difference);
                }
            }
        }
    }

    out
}

fn difference(prior: &Value, next: &Value) -> Option<Value> {
    match (prior, next) {
        (Value::Object(a), Value::Object(b)) => {
            if b.is_empty() {
                return None;
            }
            if a.is_empty() {
                return Some(next.clone());
            }
            let inner = diff_object(a, b);

            (!inner.is_empty()).then_some(Value::Object(inner))
        }
        _ => (prior != next).then(|| next.clone()),
    }
}
