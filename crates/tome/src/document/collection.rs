use crate::{
    Source,
    document::{Document, DocumentKind, ParentLink},
    model::{ModelError, ModelOptions, UpdateOptions},
    patch::{deletion_key, deletion_target, kind_label},
};
use serde_json::Value;
use std::{collections::BTreeSet, fmt};
use ulid::Ulid;

///
/// EmbeddedCollection
///
/// Ordered children of one embedded-collection field. Children that fail
/// strict construction are kept (built leniently) but tracked as invalid and
/// hidden from ordinary lookups.
///

#[derive(Clone)]
pub struct EmbeddedCollection {
    name: &'static str,
    kind: &'static dyn DocumentKind,
    owner: Option<ParentLink>,
    documents: Vec<Document>,
    invalid: BTreeSet<String>,
}

impl EmbeddedCollection {
    /// Build children from the field's source array.
    pub(crate) fn build(
        name: &'static str,
        kind: &'static dyn DocumentKind,
        source: &Value,
        owner: Option<ParentLink>,
    ) -> Self {
        let mut collection = Self {
            name,
            kind,
            owner,
            documents: Vec::new(),
            invalid: BTreeSet::new(),
        };

        if let Value::Array(items) = source {
            for item in items {
                match item {
                    Value::Object(data) => collection.initialize_document(data.clone()),
                    other => log::warn!(
                        "{name}: skipping embedded {} entry of type {}",
                        kind.metadata().name,
                        kind_label(other)
                    ),
                }
            }
        }

        collection
    }

    fn initialize_document(&mut self, mut data: Source) {
        let id = match data.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Ulid::new().to_string();
                data.insert("_id".to_string(), Value::String(id.clone()));
                id
            }
        };

        match self.construct(data.clone(), ModelOptions::default()) {
            Ok(document) => self.documents.push(document),
            Err(err) => {
                log::error!(
                    "failed to initialize {} [{id}] in {}: {err}",
                    self.kind.metadata().name,
                    self.owner_label()
                );
                match self.construct(data, ModelOptions::lenient()) {
                    Ok(document) => {
                        self.invalid.insert(id);
                        self.documents.push(document);
                    }
                    Err(err) => log::error!("dropping {} [{id}]: {err}", self.kind.metadata().name),
                }
            }
        }
    }

    fn construct(&self, data: Source, options: ModelOptions) -> Result<Document, ModelError> {
        Document::embedded(self.kind, data, self.owner.clone(), self.name, options)
    }

    fn owner_label(&self) -> String {
        self.owner
            .as_ref()
            .and_then(|owner| owner.uuid.clone())
            .unwrap_or_else(|| self.name.to_string())
    }

    // ======================================================================
    // Lookup
    // ======================================================================

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn document_name(&self) -> &'static str {
        self.kind.metadata().name
    }

    /// A valid child by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Document> {
        if self.invalid.contains(id) {
            return None;
        }

        self.find(id)
    }

    /// A child by id, including invalid children.
    #[must_use]
    pub fn get_invalid(&self, id: &str) -> Option<&Document> {
        self.invalid.contains(id).then(|| self.find(id)).flatten()
    }

    fn find(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|document| document.id() == Some(id))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Valid children in order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents
            .iter()
            .filter(|document| document.id().is_none_or(|id| !self.invalid.contains(id)))
    }

    /// Every child in order, invalid ones included.
    pub fn iter_all(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.iter().filter_map(Document::id)
    }

    #[must_use]
    pub fn invalid_ids(&self) -> &BTreeSet<String> {
        &self.invalid
    }

    /// Number of valid children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The source array the collection mirrors.
    #[must_use]
    pub fn to_source(&self) -> Value {
        Value::Array(
            self.documents
                .iter()
                .map(|document| Value::Object(document.source().clone()))
                .collect(),
        )
    }

    /// True when the children mirror `source` exactly.
    #[must_use]
    pub fn matches_source(&self, source: &Value) -> bool {
        match source {
            Value::Array(items) => {
                items.len() == self.documents.len()
                    && items
                        .iter()
                        .zip(&self.documents)
                        .all(|(item, document)| item.as_object() == Some(document.source()))
            }
            _ => self.documents.is_empty(),
        }
    }

    pub(crate) fn relink(&mut self, owner: Option<ParentLink>) {
        if self.owner != owner {
            self.owner = owner;
        }
        for document in &mut self.documents {
            document.relink(self.owner.clone());
        }
    }

    // ======================================================================
    // Update
    // ======================================================================

    /// Apply embedded changes and return the keyed diff.
    ///
    /// Accepts an array of child records (upserted by `_id`; with
    /// `recursive = false` unlisted children are removed) or an object keyed
    /// by child id, where `"-=<id>"` removes a child. The diff maps each
    /// created child to its full source, each updated child to its own diff,
    /// and each removed child to a `"-=<id>"` marker.
    pub(crate) fn update(&mut self, changes: Value, options: UpdateOptions) -> Result<Source, ModelError> {
        let mut diff = Source::new();

        match changes {
            Value::Array(items) => {
                let mut listed = BTreeSet::new();
                for item in items {
                    let data = match item {
                        Value::Object(data) => data,
                        other => {
                            return Err(ModelError::EmbeddedShape {
                                field: self.name,
                                actual: kind_label(&other),
                            });
                        }
                    };
                    let Some(id) = data.get("_id").and_then(Value::as_str).map(str::to_string) else {
                        return Err(ModelError::EmbeddedMissingId { field: self.name });
                    };
                    listed.insert(id.clone());
                    self.upsert(id, data, options, &mut diff)?;
                }

                if !options.recursive {
                    let stale: Vec<String> = self
                        .documents
                        .iter()
                        .filter_map(|document| document.id().map(str::to_string))
                        .filter(|id| !listed.contains(id))
                        .collect();
                    for id in stale {
                        self.remove(&id);
                        diff.insert(deletion_key(&id), Value::Null);
                    }
                }
            }

            Value::Object(entries) => {
                for (key, item) in entries {
                    if let Some(id) = deletion_target(&key) {
                        if self.remove(id) {
                            diff.insert(key.clone(), Value::Null);
                        }
                        continue;
                    }
                    let mut data = match item {
                        Value::Object(data) => data,
                        other => {
                            return Err(ModelError::EmbeddedShape {
                                field: self.name,
                                actual: kind_label(&other),
                            });
                        }
                    };
                    data.insert("_id".to_string(), Value::String(key.clone()));
                    self.upsert(key, data, options, &mut diff)?;
                }
            }

            other => {
                return Err(ModelError::EmbeddedShape {
                    field: self.name,
                    actual: kind_label(&other),
                });
            }
        }

        Ok(diff)
    }

    fn upsert(
        &mut self,
        id: String,
        data: Source,
        options: UpdateOptions,
        diff: &mut Source,
    ) -> Result<(), ModelError> {
        let embedded_error = |err: ModelError, id: &str| ModelError::Embedded {
            field: self.name,
            id: id.to_string(),
            source: Box::new(err),
        };

        let position = self
            .documents
            .iter()
            .position(|document| document.id() == Some(id.as_str()));

        match position {
            Some(index) => {
                let document = &mut self.documents[index];
                let inner = document
                    .update_source(Value::Object(data), options)
                    .map_err(|err| embedded_error(err, &id))?;
                if !document.invalid() {
                    self.invalid.remove(&id);
                }
                if !inner.is_empty() {
                    diff.insert(id, Value::Object(inner));
                }
            }
            None => {
                let document = self
                    .construct(data, ModelOptions::default())
                    .map_err(|err| embedded_error(err, &id))?;
                diff.insert(id, Value::Object(document.source().clone()));
                self.documents.push(document);
            }
        }

        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|document| document.id() != Some(id));
        self.invalid.remove(id);

        self.documents.len() != before
    }
}

impl fmt::Debug for EmbeddedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCollection")
            .field("name", &self.name)
            .field("documents", &self.documents)
            .field("invalid", &self.invalid)
            .finish()
    }
}
