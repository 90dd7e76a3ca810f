use crate::patch::deletion_target;
use serde_json::{Map, Value};

///
/// MergeOptions
///
/// Switches for `merge_object`.
///
/// - `insert_keys`: insert keys missing from the top level of the original.
/// - `insert_values`: insert keys missing from nested objects.
/// - `overwrite`: replace existing non-object values.
/// - `recursive`: merge objects key by key instead of replacing them.
/// - `perform_deletions`: apply `"-=key"` markers by removing `key`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MergeOptions {
    pub insert_keys: bool,
    pub insert_values: bool,
    pub overwrite: bool,
    pub recursive: bool,
    pub perform_deletions: bool,
}

impl MergeOptions {
    /// Options used when applying an update to a free-form object.
    #[must_use]
    pub const fn update() -> Self {
        Self {
            insert_keys: true,
            insert_values: true,
            overwrite: true,
            recursive: true,
            perform_deletions: true,
        }
    }

    /// Options that only touch keys already present in the original.
    #[must_use]
    pub const fn existing_only() -> Self {
        Self {
            insert_keys: false,
            insert_values: false,
            overwrite: true,
            recursive: true,
            perform_deletions: true,
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            insert_keys: true,
            insert_values: true,
            overwrite: true,
            recursive: true,
            perform_deletions: false,
        }
    }
}

/// Merge `other` into `original` in place.
pub fn merge_object(original: &mut Map<String, Value>, other: Map<String, Value>, options: MergeOptions) {
    merge_at_depth(original, other, options, 1);
}

fn merge_at_depth(
    original: &mut Map<String, Value>,
    other: Map<String, Value>,
    options: MergeOptions,
    depth: usize,
) {
    for (key, value) in other {
        if let Some(target) = deletion_target(&key) {
            if options.perform_deletions {
                original.remove(target);
                continue;
            }
        }

        match original.get_mut(&key) {
            Some(existing) => merge_existing(existing, value, options, depth),
            None => {
                let allowed = if depth <= 1 {
                    options.insert_keys
                } else {
                    options.insert_values
                };
                if allowed {
                    original.insert(key, strip_deletions(value, options));
                }
            }
        }
    }
}

// Merge into a key that already exists in the original.
fn merge_existing(existing: &mut Value, value: Value, options: MergeOptions, depth: usize) {
    match (existing, value) {
        (Value::Object(current), Value::Object(incoming)) if options.recursive => {
            merge_at_depth(current, incoming, options, depth + 1);
        }
        (existing, value) => {
            if options.overwrite {
                *existing = strip_deletions(value, options);
            }
        }
    }
}

// Inserted objects must not carry deletion markers into the stored record.
fn strip_deletions(value: Value, options: MergeOptions) -> Value {
    match value {
        Value::Object(map) if options.perform_deletions => Value::Object(
            map.into_iter()
                .filter(|(k, _)| deletion_target(k).is_none())
                .map(|(k, v)| (k, strip_deletions(v, options)))
                .collect(),
        ),
        other => other,
    }
}
