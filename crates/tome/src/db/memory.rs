//! Reference backend keeping world and compendium documents in memory.
//!
//! Top-level documents live in one store per `(pack, document name)`.
//! Embedded documents are never stored on their own: every embedded
//! mutation is routed through the root document's `update_source`, so the
//! root is updated atomically or not at all.

use crate::{
    Source,
    db::{
        Action, BackendConfig, DatabaseBackend, DatabaseError, DatabaseOperation, DocumentUpdate,
        GetResult, now_millis, permission_error,
    },
    document::{
        Document, DocumentKind, DocumentOptions,
        ownership::{CompendiumOwnership, OwnershipLevel, User},
        parse_uuid,
    },
    field::FieldKind,
    model::UpdateOptions,
    patch::deletion_key,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use ulid::Ulid;

type StoreKey = (Option<String>, String);
type Stores = BTreeMap<StoreKey, BTreeMap<String, Document>>;

///
/// InMemoryBackend
///

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    config: BackendConfig,
    stores: RwLock<Stores>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(Stores::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Number of top-level documents of one type in the world or a pack.
    pub fn count(&self, document_name: &str, pack: Option<&str>) -> Result<usize, DatabaseError> {
        let stores = self.read()?;
        let key = (pack.map(str::to_string), document_name.to_string());

        Ok(stores.get(&key).map_or(0, BTreeMap::len))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Stores>, DatabaseError> {
        self.stores
            .read()
            .map_err(|_| DatabaseError::LockPoisoned("document store read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Stores>, DatabaseError> {
        self.stores
            .write()
            .map_err(|_| DatabaseError::LockPoisoned("document store write"))
    }

    fn compendium_ownership(&self, pack: Option<&str>) -> CompendiumOwnership {
        pack.and_then(|name| self.config.pack(name))
            .and_then(|pack| pack.ownership().ok())
            .unwrap_or_default()
    }

    // the pack an operation lands in, and the role ownership it grants
    fn scope(&self, target: Option<&Target>, operation: &DatabaseOperation) -> CompendiumOwnership {
        let pack = target.map_or(operation.pack.as_deref(), |target| target.root_key.0.as_deref());
        self.compendium_ownership(pack)
    }

    // a compendium holds only the document type it is declared for
    fn check_pack(&self, kind: &'static dyn DocumentKind, operation: &DatabaseOperation) -> Result<(), DatabaseError> {
        let Some(name) = operation.pack.as_deref() else {
            return Ok(());
        };
        match self.config.pack(name) {
            Some(pack) if pack.document_name == kind.metadata().name => Ok(()),
            _ => Err(DatabaseError::InvalidPack(name.to_string())),
        }
    }

    fn can_read(&self, document: &Document, user: &User) -> bool {
        if user.is_gm() {
            return true;
        }
        if user.is_banned() {
            return false;
        }

        let ownership = self.compendium_ownership(document.pack());
        document.get_user_level_in(user, &ownership) >= OwnershipLevel::Limited
    }

    // ======================================================================
    // Embedded routing
    // ======================================================================

    // the embedded location an operation addresses, if it has a parent
    fn locate(
        &self,
        stores: &Stores,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
    ) -> Result<Option<Target>, DatabaseError> {
        let Some(uuid) = operation.parent_uuid.as_deref() else {
            return Ok(None);
        };
        let not_found = || DatabaseError::ParentNotFound(uuid.to_string());

        let parsed = parse_uuid(uuid, &self.config.pack_names()).ok_or_else(not_found)?;
        let mut path = parsed.path.into_iter();
        let (root_name, root_id) = path.next().ok_or_else(not_found)?;

        let mut target = Target {
            uuid: uuid.to_string(),
            root_key: (parsed.pack, root_name),
            root_id,
            steps: Vec::new(),
            field: "",
            singleton: false,
        };
        let mut current = stores
            .get(&target.root_key)
            .and_then(|store| store.get(&target.root_id))
            .ok_or_else(not_found)?;

        for (name, id) in path {
            let (field, singleton) = embedded_field(current, &name)?;
            current = current
                .get_embedded_document(&name, &id, true)
                .ok_or_else(not_found)?;
            target.steps.push(Step {
                name,
                id,
                field,
                singleton,
            });
        }
        (target.field, target.singleton) = embedded_field(current, kind.metadata().name)?;

        Ok(Some(target))
    }

    // apply a change at the target through the root, returning the root diff
    fn commit(
        stores: &mut Stores,
        target: &Target,
        leaf: Value,
        options: UpdateOptions,
    ) -> Result<Source, DatabaseError> {
        let root = stores
            .get_mut(&target.root_key)
            .and_then(|store| store.get_mut(&target.root_id))
            .ok_or_else(|| DatabaseError::ParentNotFound(target.uuid.clone()))?;

        Ok(root.update_source(target.wrap(leaf), options)?)
    }

    fn denied(user: &User, action: Action, document: &Document, operation: &DatabaseOperation) -> DatabaseError {
        let subject = match document.id() {
            Some(id) => format!("{} [{id}]", document.document_name()),
            None => document.document_name().to_string(),
        };

        DatabaseError::PermissionDenied(permission_error(
            user,
            action,
            &subject,
            operation.parent_uuid.as_deref(),
            operation.pack.as_deref(),
        ))
    }
}

#[async_trait]
impl DatabaseBackend for InMemoryBackend {
    async fn get_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<GetResult, DatabaseError> {
        let stores = self.read()?;

        let candidates: Vec<&Document> = match self.locate(&stores, kind, operation)? {
            Some(target) => target.children(target.parent(&stores)?),
            None => {
                self.check_pack(kind, operation)?;
                stores
                    .get(&store_key(kind, operation))
                    .map(|store| store.values().collect())
                    .unwrap_or_default()
            }
        };

        let documents: Vec<Document> = candidates
            .into_iter()
            .filter(|document| matches_query(document, operation.query.as_ref()))
            .filter(|document| self.can_read(document, user))
            .cloned()
            .collect();

        if operation.index == Some(true) {
            return Ok(GetResult::Index(documents.iter().map(index_record).collect()));
        }

        Ok(GetResult::Documents(documents))
    }

    async fn create_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError> {
        let name = kind.metadata().name;
        let mut stores = self.write()?;
        let target = self.locate(&stores, kind, operation)?;
        if target.is_none() {
            self.check_pack(kind, operation)?;
        }
        let ownership = self.scope(target.as_ref(), operation);

        let (options, mut taken): (DocumentOptions, BTreeSet<String>) = match &target {
            Some(target) => {
                let parent = target.parent(&stores)?;
                let taken = target
                    .all_children(parent)
                    .into_iter()
                    .filter_map(|child| child.id().map(str::to_string))
                    .collect();

                (
                    DocumentOptions::default().with_parent(parent.link(), target.field),
                    taken,
                )
            }
            None => {
                let mut options = DocumentOptions::default();
                options.pack.clone_from(&operation.pack);
                let taken = stores
                    .get(&store_key(kind, operation))
                    .map(|store| store.keys().cloned().collect())
                    .unwrap_or_default();

                (options, taken)
            }
        };

        let now = now_millis();
        let mut created = Vec::new();
        for data in operation.data_items() {
            let mut data = data.as_object().cloned().unwrap_or_default();
            let kept = operation.keep_id == Some(true)
                && data
                    .get("_id")
                    .and_then(Value::as_str)
                    .is_some_and(crate::field::is_valid_id);
            if !kept {
                data.insert("_id".to_string(), Value::String(Ulid::new().to_string()));
            }
            let id = data
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default();
            if !taken.insert(id.clone()) {
                return Err(DatabaseError::AlreadyExists {
                    document_name: name,
                    id,
                });
            }
            stamp_stats(kind, &mut data, now, &user.id, true);

            let document = Document::new(kind, data, options.clone())?;
            if !document.can_user_modify_in(
                user,
                Action::Create,
                &Value::Object(document.source().clone()),
                &ownership,
            ) {
                return Err(Self::denied(user, Action::Create, &document, operation));
            }
            created.push(document);
        }

        let Some(target) = target else {
            let store = stores.entry(store_key(kind, operation)).or_default();
            for document in &created {
                if let Some(id) = document.id() {
                    store.insert(id.to_string(), document.clone());
                }
            }
            return Ok(created);
        };

        let leaf = if target.singleton {
            match created.as_slice() {
                [] => return Ok(created),
                [document] if target.all_children(target.parent(&stores)?).is_empty() => {
                    Value::Object(document.source().clone())
                }
                [document, ..] => {
                    return Err(DatabaseError::AlreadyExists {
                        document_name: name,
                        id: document.id().unwrap_or_default().to_string(),
                    });
                }
            }
        } else {
            Value::Object(
                created
                    .iter()
                    .filter_map(|document| {
                        let id = document.id()?;
                        Some((id.to_string(), Value::Object(document.source().clone())))
                    })
                    .collect(),
            )
        };
        Self::commit(&mut stores, &target, leaf, UpdateOptions::default())?;

        // hand back the children as they now live inside the parent
        let parent = target.parent(&stores)?;
        Ok(created
            .iter()
            .filter_map(|document| target.child(parent, document.id()?))
            .cloned()
            .collect())
    }

    async fn update_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<DocumentUpdate>, DatabaseError> {
        let name = kind.metadata().name;
        let options = UpdateOptions {
            recursive: operation.is_recursive(),
            ..UpdateOptions::default()
        };
        let now = now_millis();
        let mut stores = self.write()?;
        let target = self.locate(&stores, kind, operation)?;
        if target.is_none() {
            self.check_pack(kind, operation)?;
        }
        let ownership = self.scope(target.as_ref(), operation);

        let mut requests = Vec::new();
        for update in operation.update_items() {
            let mut changes = update.as_object().cloned().unwrap_or_default();
            let id = changes
                .remove("_id")
                .and_then(|id| id.as_str().map(str::to_string))
                .ok_or_else(|| DatabaseError::InvalidOperation {
                    action: Action::Update,
                    message: "every update must carry the _id of its target document".to_string(),
                })?;
            stamp_stats(kind, &mut changes, now, &user.id, false);
            requests.push((id, update, changes));
        }

        let Some(target) = target else {
            let key = store_key(kind, operation);
            let store = stores.get(&key);

            // stage every update on a copy; commit only when all succeed
            let mut staged: Vec<DocumentUpdate> = Vec::with_capacity(requests.len());
            for (id, update, changes) in requests {
                let position = staged
                    .iter()
                    .position(|result| result.document.id() == Some(id.as_str()));
                let mut document = match position {
                    Some(index) => staged.remove(index).document,
                    None => store
                        .and_then(|store| store.get(&id))
                        .cloned()
                        .ok_or_else(|| DatabaseError::NotFound {
                            document_name: name,
                            id: id.clone(),
                        })?,
                };
                if !document.can_user_modify_in(user, Action::Update, update, &ownership) {
                    return Err(Self::denied(user, Action::Update, &document, operation));
                }
                let changes = document.update_source(Value::Object(changes), options)?;
                staged.push(DocumentUpdate { document, changes });
            }

            let store = stores.entry(key).or_default();
            for result in &staged {
                if let Some(id) = result.document.id() {
                    store.insert(id.to_string(), result.document.clone());
                }
            }
            return Ok(staged);
        };

        let parent = target.parent(&stores)?;
        let mut leaf = Map::new();
        let mut ids = Vec::with_capacity(requests.len());
        for (id, update, changes) in requests {
            let child = target.child(parent, &id).ok_or_else(|| DatabaseError::NotFound {
                document_name: name,
                id: id.clone(),
            })?;
            if !child.can_user_modify_in(user, Action::Update, update, &ownership) {
                return Err(Self::denied(user, Action::Update, child, operation));
            }
            if target.singleton {
                leaf = changes;
            } else {
                leaf.insert(id.clone(), Value::Object(changes));
            }
            ids.push(id);
        }
        let diff = Self::commit(&mut stores, &target, Value::Object(leaf), options)?;

        let parent = target.parent(&stores)?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                Some(DocumentUpdate {
                    document: target.child(parent, id)?.clone(),
                    changes: target.extract(&diff, id),
                })
            })
            .collect())
    }

    async fn delete_documents(
        &self,
        kind: &'static dyn DocumentKind,
        operation: &DatabaseOperation,
        user: &User,
    ) -> Result<Vec<Document>, DatabaseError> {
        let name = kind.metadata().name;
        let delete_all = operation.delete_all == Some(true);
        let mut stores = self.write()?;
        let target = self.locate(&stores, kind, operation)?;
        if target.is_none() {
            self.check_pack(kind, operation)?;
        }
        let ownership = self.scope(target.as_ref(), operation);

        let Some(target) = target else {
            let key = store_key(kind, operation);
            let store = stores.get(&key);
            let ids: Vec<String> = if delete_all {
                store
                    .map(|store| store.keys().cloned().collect())
                    .unwrap_or_default()
            } else {
                operation.id_items().into_iter().map(str::to_string).collect()
            };

            let mut doomed = Vec::with_capacity(ids.len());
            for id in &ids {
                let document = store
                    .and_then(|store| store.get(id))
                    .ok_or_else(|| DatabaseError::NotFound {
                        document_name: name,
                        id: id.clone(),
                    })?;
                if !document.can_user_modify_in(user, Action::Delete, &Value::Null, &ownership) {
                    return Err(Self::denied(user, Action::Delete, document, operation));
                }
                doomed.push(document.clone());
            }

            if let Some(store) = stores.get_mut(&key) {
                for id in &ids {
                    store.remove(id);
                }
            }
            return Ok(doomed);
        };

        let parent = target.parent(&stores)?;
        let doomed: Vec<Document> = if delete_all {
            target.all_children(parent).into_iter().cloned().collect()
        } else {
            operation
                .id_items()
                .into_iter()
                .map(|id| {
                    target
                        .child(parent, id)
                        .cloned()
                        .ok_or_else(|| DatabaseError::NotFound {
                            document_name: name,
                            id: id.to_string(),
                        })
                })
                .collect::<Result<_, _>>()?
        };
        if doomed.is_empty() {
            return Ok(doomed);
        }
        for document in &doomed {
            if !document.can_user_modify_in(user, Action::Delete, &Value::Null, &ownership) {
                return Err(Self::denied(user, Action::Delete, document, operation));
            }
        }

        let leaf = if target.singleton {
            Value::Null
        } else {
            Value::Object(
                doomed
                    .iter()
                    .filter_map(Document::id)
                    .map(|id| (deletion_key(id), Value::Null))
                    .collect(),
            )
        };
        Self::commit(&mut stores, &target, leaf, UpdateOptions::default())?;

        Ok(doomed)
    }

    fn flag_scopes(&self) -> Vec<String> {
        self.config.flag_scopes.clone()
    }

    fn compendium_scopes(&self) -> Vec<String> {
        self.config.pack_names()
    }

    async fn resolve_uuid(&self, uuid: &str) -> Result<Option<Document>, DatabaseError> {
        let Some(parsed) = parse_uuid(uuid, &self.config.pack_names()) else {
            return Ok(None);
        };
        let stores = self.read()?;

        let mut path = parsed.path.iter();
        let Some((root_name, root_id)) = path.next() else {
            return Ok(None);
        };
        let root = stores
            .get(&(parsed.pack.clone(), root_name.clone()))
            .and_then(|store| store.get(root_id));

        Ok(path
            .fold(root, |current, (name, id)| {
                current.and_then(|document| document.get_embedded_document(name, id, true))
            })
            .cloned())
    }
}

///
/// Target
///
/// Path from a stored root document down to the field that holds the
/// operated embedded documents.
///

struct Target {
    uuid: String,
    root_key: StoreKey,
    root_id: String,
    steps: Vec<Step>,
    field: &'static str,
    singleton: bool,
}

struct Step {
    name: String,
    id: String,
    field: &'static str,
    singleton: bool,
}

impl Target {
    fn parent<'a>(&self, stores: &'a Stores) -> Result<&'a Document, DatabaseError> {
        let root = stores
            .get(&self.root_key)
            .and_then(|store| store.get(&self.root_id));

        self.steps
            .iter()
            .fold(root, |current, step| {
                current.and_then(|document| document.get_embedded_document(&step.name, &step.id, true))
            })
            .ok_or_else(|| DatabaseError::ParentNotFound(self.uuid.clone()))
    }

    // valid children only
    fn children<'a>(&self, parent: &'a Document) -> Vec<&'a Document> {
        if self.singleton {
            return parent.singleton(self.field).into_iter().collect();
        }

        parent
            .collection(self.field)
            .map(|collection| collection.iter().collect())
            .unwrap_or_default()
    }

    fn all_children<'a>(&self, parent: &'a Document) -> Vec<&'a Document> {
        if self.singleton {
            return parent.singleton(self.field).into_iter().collect();
        }

        parent
            .collection(self.field)
            .map(|collection| collection.iter_all().collect())
            .unwrap_or_default()
    }

    fn child<'a>(&self, parent: &'a Document, id: &str) -> Option<&'a Document> {
        self.all_children(parent)
            .into_iter()
            .find(|child| child.id() == Some(id))
    }

    // nest a leaf change under every step, collections in keyed form
    fn wrap(&self, leaf: Value) -> Value {
        let mut change = Map::new();
        change.insert(self.field.to_string(), leaf);

        self.steps
            .iter()
            .rev()
            .fold(Value::Object(change), |inner, step| {
                let value = if step.singleton {
                    inner
                } else {
                    let mut keyed = Map::new();
                    keyed.insert(step.id.clone(), inner);
                    Value::Object(keyed)
                };
                let mut change = Map::new();
                change.insert(step.field.to_string(), value);

                Value::Object(change)
            })
    }

    // the part of a root diff that belongs to one child
    fn extract(&self, diff: &Source, id: &str) -> Source {
        let mut node = diff;
        for step in &self.steps {
            let value = node.get(step.field);
            let value = if step.singleton {
                value
            } else {
                value.and_then(|value| value.get(&step.id))
            };
            match value.and_then(Value::as_object) {
                Some(next) => node = next,
                None => return Source::new(),
            }
        }

        let value = node.get(self.field);
        let value = if self.singleton {
            value
        } else {
            value.and_then(|value| value.get(id))
        };

        value.and_then(Value::as_object).cloned().unwrap_or_default()
    }
}

fn store_key(kind: &'static dyn DocumentKind, operation: &DatabaseOperation) -> StoreKey {
    (operation.pack.clone(), kind.metadata().name.to_string())
}

fn embedded_field(document: &Document, name: &str) -> Result<(&'static str, bool), DatabaseError> {
    let (field, _) = document
        .embedded_kind(name)
        .map_err(|err| DatabaseError::InvalidParent(err.to_string()))?;
    let singleton = matches!(
        document.schema().get(field).map(|field| &field.kind),
        Some(FieldKind::EmbeddedDocument(_))
    );

    Ok((field, singleton))
}

fn stamp_stats(kind: &'static dyn DocumentKind, data: &mut Source, now: i64, user_id: &str, created: bool) {
    if !kind.schema().has("_stats") {
        return;
    }

    let stats = data
        .entry("_stats")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(stats) = stats {
        if created {
            stats.insert("createdTime".to_string(), json!(now));
        }
        stats.insert("modifiedTime".to_string(), json!(now));
        stats.insert("lastModifiedBy".to_string(), json!(user_id));
    }
}

// equality per key; an array expectation matches any of its members
fn matches_query(document: &Document, query: Option<&Value>) -> bool {
    let Some(Value::Object(query)) = query else {
        return true;
    };

    query.iter().all(|(path, expected)| {
        let actual = document.get(path).unwrap_or(Value::Null);
        match expected {
            Value::Array(options) if !actual.is_array() => options.contains(&actual),
            expected => actual == *expected,
        }
    })
}

fn index_record(document: &Document) -> Value {
    let mut record = Map::new();
    record.insert("_id".to_string(), json!(document.id()));
    record.insert("uuid".to_string(), json!(document.uuid()));
    for key in ["name", "type", "img"] {
        if let Some(value) = document.source().get(key) {
            record.insert(key.to_string(), value.clone());
        }
    }

    Value::Object(record)
}
