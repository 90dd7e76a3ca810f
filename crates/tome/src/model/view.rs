use crate::{
    Source,
    document::{Document, collection::EmbeddedCollection},
};
use serde_json::Value;
use std::collections::BTreeMap;

///
/// ViewEntry
///
/// Instance-side representation of one field.
///

#[derive(Clone, Debug)]
pub enum ViewEntry {
    Value(Value),
    Readonly(Value),
    /// Computed from source on every read.
    Getter(fn(&Source) -> Value),
    Collection(EmbeddedCollection),
    Singleton(Option<Box<Document>>),
}

impl ViewEntry {
    /// Current value of the entry as plain data.
    #[must_use]
    pub fn value(&self, source: &Source) -> Value {
        match self {
            Self::Value(value) | Self::Readonly(value) => value.clone(),
            Self::Getter(getter) => getter(source),
            Self::Collection(collection) => collection.to_source(),
            Self::Singleton(Some(document)) => document.to_object(true),
            Self::Singleton(None) => Value::Null,
        }
    }
}

///
/// InstanceView
///

#[derive(Clone, Debug, Default)]
pub struct InstanceView {
    entries: BTreeMap<&'static str, ViewEntry>,
}

impl InstanceView {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ViewEntry> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ViewEntry> {
        self.entries.get_mut(name)
    }

    pub(crate) fn insert(&mut self, name: &'static str, entry: ViewEntry) {
        self.entries.insert(name, entry);
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut ViewEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> Option<&mut EmbeddedCollection> {
        match self.entries.get_mut(name)? {
            ViewEntry::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub(crate) fn singleton_mut(&mut self, name: &str) -> Option<&mut Document> {
        match self.entries.get_mut(name)? {
            ViewEntry::Singleton(Some(document)) => Some(&mut **document),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
