use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

///
/// DatabaseOperation
///
/// Normalized description of one CRUD request. Only the payload matching the
/// action is used: `data` for create, `updates` for update, `ids` for
/// delete, `query` for get. `parent` is resolved by the pipeline and never
/// crosses the wire; `parent_uuid` does.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    #[serde(skip)]
    pub parent: Option<Box<Document>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_sheet: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_all: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_id: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<i64>,
}

impl DatabaseOperation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An operation scoped to the embedded children of `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Document) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// An operation scoped to the document at `uuid`.
    #[must_use]
    pub fn with_parent_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.parent_uuid = Some(uuid.into());
        self
    }

    #[must_use]
    pub fn in_pack(mut self, pack: impl Into<String>) -> Self {
        self.pack = Some(pack.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub const fn keep_id(mut self) -> Self {
        self.keep_id = Some(true);
        self
    }

    #[must_use]
    pub const fn delete_all(mut self) -> Self {
        self.delete_all = Some(true);
        self
    }

    #[must_use]
    pub const fn index(mut self) -> Self {
        self.index = Some(true);
        self
    }

    #[must_use]
    pub const fn replace(mut self) -> Self {
        self.recursive = Some(false);
        self
    }

    // ======================================================================
    // Payload accessors
    // ======================================================================

    /// Create payload entries; empty when absent or malformed.
    #[must_use]
    pub fn data_items(&self) -> &[Value] {
        items(self.data.as_ref())
    }

    #[must_use]
    pub fn update_items(&self) -> &[Value] {
        items(self.updates.as_ref())
    }

    /// Delete targets as strings.
    #[must_use]
    pub fn id_items(&self) -> Vec<&str> {
        items(self.ids.as_ref())
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    /// Whether updates merge recursively (the default).
    #[must_use]
    pub fn is_recursive(&self) -> bool {
        self.recursive.unwrap_or(true)
    }
}

fn items(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}
