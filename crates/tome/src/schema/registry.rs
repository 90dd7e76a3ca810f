use crate::{model::ModelKind, schema::Schema};
use std::{
    collections::HashMap,
    sync::{LazyLock, PoisonError, RwLock},
};

///
/// SCHEMA_REGISTRY
///
/// One schema per root model kind, defined once and leaked for the process
/// lifetime. Subtypes resolve to their root ancestor's entry.
///

static SCHEMA_REGISTRY: LazyLock<RwLock<HashMap<&'static str, &'static Schema>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Return the schema of a model kind, defining it on first use.
pub fn schema_for<K: ModelKind + ?Sized>(kind: &K) -> &'static Schema {
    match kind.base_kind() {
        Some(base) => root_schema(base),
        None => lookup_or_define(kind),
    }
}

fn root_schema(kind: &dyn ModelKind) -> &'static Schema {
    let mut root = kind;
    while let Some(base) = root.base_kind() {
        root = base;
    }

    lookup_or_define(root)
}

fn lookup_or_define<K: ModelKind + ?Sized>(kind: &K) -> &'static Schema {
    let name = kind.name();
    let cached = SCHEMA_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .copied();
    if let Some(schema) = cached {
        return schema;
    }

    // defined outside the lock: definitions may resolve other schemas
    let mut schema = kind.define_schema();
    for &(legacy, current) in kind.shims() {
        schema.push_shim(legacy, current);
    }

    let mut registry = SCHEMA_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);

    *registry
        .entry(name)
        .or_insert_with(|| &*Box::leak(Box::new(schema)))
}
