//! Helpers for `ModelKind::migrate_data` implementations.

use crate::{Source, patch::kind_label};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

///
/// MigrationError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum MigrationError {
    #[error("field '{field}' has an unexpected shape: expected {expected}, found {actual}")]
    InvalidShape {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    Message(String),
}

impl MigrationError {
    #[must_use]
    pub fn invalid_shape(field: &str, expected: &'static str, found: &Value) -> Self {
        Self::InvalidShape {
            field: field.to_string(),
            expected,
            actual: kind_label(found),
        }
    }
}

/// Move the value at `legacy` to `current` when only the legacy path is
/// present. Both paths may be dotted. Returns true when data moved.
pub fn rename_field(source: &mut Source, legacy: &str, current: &str) -> bool {
    migrate_field_with(source, legacy, current, |value| value)
}

/// Like `rename_field`, transforming the moved value.
pub fn migrate_field_with(
    source: &mut Source,
    legacy: &str,
    current: &str,
    apply: impl FnOnce(Value) -> Value,
) -> bool {
    if has_path(source, current) || !has_path(source, legacy) {
        return false;
    }
    let Some(value) = take_path(source, legacy) else {
        return false;
    };
    if !writable(source, current) {
        set_path(source, legacy, value);
        return false;
    }

    set_path(source, current, apply(value))
}

/// Set `path` to `value` when absent. Returns true when a value was written.
pub fn apply_default(source: &mut Source, path: &str, value: Value) -> bool {
    if has_path(source, path) {
        return false;
    }

    set_path(source, path, value)
}

fn has_path(source: &Source, path: &str) -> bool {
    let mut current = source;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let Some(value) = current.get(segment) else {
            return false;
        };
        if segments.peek().is_none() {
            return true;
        }
        let Value::Object(inner) = value else {
            return false;
        };
        current = inner;
    }

    false
}

// Every existing segment above the leaf must be an object.
fn writable(source: &Source, path: &str) -> bool {
    match path.split_once('.') {
        None => true,
        Some((head, rest)) => match source.get(head) {
            None => true,
            Some(Value::Object(inner)) => writable(inner, rest),
            Some(_) => false,
        },
    }
}

fn take_path(source: &mut Source, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => source.remove(path),
        Some((head, rest)) => match source.get_mut(head)? {
            Value::Object(inner) => take_path(inner, rest),
            _ => None,
        },
    }
}

// Intermediate objects are created; a scalar in the way aborts the write.
fn set_path(source: &mut Source, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => {
            source.insert(path.to_string(), value);
            true
        }
        Some((head, rest)) => {
            let entry = source
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(inner) => set_path(inner, rest, value),
                _ => false,
            }
        }
    }
}
