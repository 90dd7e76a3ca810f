use serde_json::Value;
use thiserror::Error as ThisError;

///
/// PatchError
///
/// A change-set key that cannot be expanded. Keys are reported in full,
/// from the root of the change set, so `{"system": {"hp.value": 1}}` fails
/// as `system.hp.value`.
///

#[remain::sorted]
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PatchError {
    #[error("change key '{key}' has an empty segment")]
    EmptySegment { key: String },

    #[error("change key '{key}' nests under '{blocked}', which holds a {found}")]
    InvalidShape {
        key: String,
        blocked: String,
        found: &'static str,
    },
}

impl PatchError {
    /// The full dotted key that could not be expanded.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::EmptySegment { key } | Self::InvalidShape { key, .. } => key,
        }
    }

    // re-anchor a failure from a nested object or array under its holder
    #[must_use]
    pub(crate) fn under(self, holder: &str) -> Self {
        let anchor = |key: String| format!("{holder}.{key}");
        match self {
            Self::EmptySegment { key } => Self::EmptySegment { key: anchor(key) },
            Self::InvalidShape { key, blocked, found } => Self::InvalidShape {
                key: anchor(key),
                blocked: anchor(blocked),
                found,
            },
        }
    }
}

/// Short type label of a JSON value for shape errors.
#[must_use]
pub(crate) const fn kind_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
