//! Path and structural helpers over raw JSON records.
//!
//! Change sets arrive with dotted keys (`"hp.value"`) and deletion markers
//! (`"-=key"`); these helpers turn them into nested shapes, compute minimal
//! differences, and merge in place.

mod diff;
mod error;
mod expand;
mod merge;


pub use diff::diff_object;
pub(crate) use error::kind_label;
pub use error::PatchError;
pub use expand::{expand_object, get_property, has_property};
pub use merge::{MergeOptions, merge_object};

use crate::DELETION_PREFIX;

/// Return the target key of a deletion marker (`"-=key"` → `"key"`).
#[must_use]
pub fn deletion_target(key: &str) -> Option<&str> {
    key.strip_prefix(DELETION_PREFIX)
}

/// Build the deletion marker for a key.
#[must_use]
pub fn deletion_key(key: &str) -> String {
    format!("{DELETION_PREFIX}{key}")
}
