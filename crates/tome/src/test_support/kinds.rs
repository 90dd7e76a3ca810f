use crate::{
    Source,
    db::DatabaseOperation,
    document::{
        Document, DocumentError, DocumentKind, DocumentMetadata, Permissions,
        ownership::{Permission, User, UserRole},
    },
    field::Field,
    model::{
        ModelKind, UpdateOptions,
        migrate::{self, MigrationError},
    },
    schema::Schema,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Mutex, PoisonError};

// ======================================================================
// Creature: a plain model
// ======================================================================

pub(crate) struct CreatureKind;

pub(crate) static CREATURE: CreatureKind = CreatureKind;

impl ModelKind for CreatureKind {
    fn name(&self) -> &'static str {
        "Creature"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::string("name").required(),
            Field::schema(
                "hp",
                Schema::new([Field::number("value"), Field::number("max")]),
            ),
            Field::set("tags", Field::string("tag")),
            Field::object("notes"),
        ])
    }

    fn validate_joint(&self, source: &Source) -> Result<(), String> {
        hp_within_max(source)
    }
}

fn hp_within_max(source: &Source) -> Result<(), String> {
    let hp = source.get("hp");
    let value = hp.and_then(|hp| hp.get("value")).and_then(Value::as_f64);
    let max = hp.and_then(|hp| hp.get("max")).and_then(Value::as_f64);

    match (value, max) {
        (Some(value), Some(max)) if value > max => Err("hp.value may not exceed hp.max".to_string()),
        _ => Ok(()),
    }
}

// ======================================================================
// Actor type data
// ======================================================================

pub(crate) struct HeroData;

impl ModelKind for HeroData {
    fn name(&self) -> &'static str {
        "HeroData"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::number("level").integer().min(1.0).initial(json!(1)),
            Field::number("xp").integer().min(0.0).initial(json!(0)),
        ])
    }

    fn validate_joint(&self, source: &Source) -> Result<(), String> {
        let level = source.get("level").and_then(Value::as_i64).unwrap_or(1);
        let xp = source.get("xp").and_then(Value::as_i64).unwrap_or(0);
        if level > 1 && xp == 0 {
            return Err("a hero above level 1 must have experience".to_string());
        }

        Ok(())
    }
}

pub(crate) struct NpcData;

impl ModelKind for NpcData {
    fn name(&self) -> &'static str {
        "NpcData"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([Field::number("cr").min(0.0).initial(json!(0))])
    }
}

static ACTOR_TYPES: &[(&str, &dyn ModelKind)] = &[("hero", &HeroData), ("npc", &NpcData)];

// ======================================================================
// Actor
// ======================================================================

pub(crate) struct ActorKind;

pub(crate) static ACTOR: ActorKind = ActorKind;

static ACTOR_METADATA: DocumentMetadata = DocumentMetadata {
    name: "Actor",
    collection: "actors",
    embedded: &[
        ("Item", "items"),
        ("ActiveEffect", "effects"),
        ("Portrait", "portrait"),
    ],
    has_type_data: true,
    permissions: Permissions {
        create: Permission::Role(UserRole::Player),
        update: Permission::Owner,
        delete: Permission::Role(UserRole::Assistant),
    },
};

impl ModelKind for ActorKind {
    fn name(&self) -> &'static str {
        "Actor"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("name").required(),
            Field::string("type")
                .choices(&["hero", "npc"])
                .initial(json!("hero")),
            Field::schema(
                "hp",
                Schema::new([
                    Field::number("value").integer().min(0.0).initial(json!(10)),
                    Field::number("max").integer().min(0.0).initial(json!(10)),
                ]),
            ),
            Field::type_data("system", "type", ACTOR_TYPES),
            Field::embedded_collection("items", &ITEM),
            Field::embedded_collection("effects", &EFFECT),
            Field::embedded_document("portrait", &PORTRAIT),
            Field::string("label").getter(actor_label),
            Field::ownership(),
            Field::flags(),
            Field::document_stats(),
        ])
    }

    fn shims(&self) -> &'static [(&'static str, &'static str)] {
        &[("data", "system")]
    }

    fn migrate_data(&self, source: &mut Source) -> Result<(), MigrationError> {
        migrate::rename_field(source, "data", "system");
        migrate::rename_field(source, "hitPoints", "hp");
        if source.get("corrupt").is_some_and(|value| !value.is_null()) {
            return Err(MigrationError::Message("corrupt legacy record".to_string()));
        }

        Ok(())
    }

    fn validate_joint(&self, source: &Source) -> Result<(), String> {
        hp_within_max(source)
    }
}

impl DocumentKind for ActorKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &ACTOR_METADATA
    }
}

fn actor_label(source: &Source) -> Value {
    let name = source.get("name").and_then(Value::as_str).unwrap_or_default();
    let kind = source.get("type").and_then(Value::as_str).unwrap_or_default();

    json!(format!("{name} ({kind})"))
}

// ======================================================================
// Item
// ======================================================================

pub(crate) struct ItemKind;

pub(crate) static ITEM: ItemKind = ItemKind;

static ITEM_METADATA: DocumentMetadata = DocumentMetadata {
    name: "Item",
    collection: "items",
    embedded: &[("ActiveEffect", "effects")],
    has_type_data: false,
    permissions: Permissions::DEFAULT,
};

impl ModelKind for ItemKind {
    fn name(&self) -> &'static str {
        "Item"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("name").required(),
            Field::number("quantity").integer().min(0.0).initial(json!(1)),
            Field::embedded_collection("effects", &EFFECT),
            Field::flags(),
            Field::document_stats(),
        ])
    }
}

impl DocumentKind for ItemKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &ITEM_METADATA
    }
}

// ======================================================================
// ActiveEffect
// ======================================================================

pub(crate) struct EffectKind;

pub(crate) static EFFECT: EffectKind = EffectKind;

static EFFECT_METADATA: DocumentMetadata = DocumentMetadata::new("ActiveEffect", "effects");

impl ModelKind for EffectKind {
    fn name(&self) -> &'static str {
        "ActiveEffect"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("name").required(),
            Field::boolean("disabled"),
            Field::number("duration").min(0.0),
        ])
    }
}

impl DocumentKind for EffectKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &EFFECT_METADATA
    }
}

// ======================================================================
// Portrait (singleton)
// ======================================================================

pub(crate) struct PortraitKind;

pub(crate) static PORTRAIT: PortraitKind = PortraitKind;

static PORTRAIT_METADATA: DocumentMetadata = DocumentMetadata::new("Portrait", "portraits");

impl ModelKind for PortraitKind {
    fn name(&self) -> &'static str {
        "Portrait"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("src").required(),
            Field::number("scale").positive().not_nullable().initial(json!(1)),
        ])
    }
}

impl DocumentKind for PortraitKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &PORTRAIT_METADATA
    }
}

// ======================================================================
// JournalEntry: records every hook it sees
// ======================================================================

pub(crate) struct JournalKind;

pub(crate) static JOURNAL: JournalKind = JournalKind;

static JOURNAL_METADATA: DocumentMetadata = DocumentMetadata {
    name: "JournalEntry",
    collection: "journal",
    embedded: &[],
    has_type_data: false,
    permissions: Permissions {
        create: Permission::Role(UserRole::Player),
        update: Permission::Owner,
        delete: Permission::Custom(author_may_delete),
    },
};

static HOOK_EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn record(event: &str, names: &str) {
    HOOK_EVENTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(format!("{event}:{names}"));
}

/// Hook events whose document names mention `tag`, in order.
pub(crate) fn hook_events(tag: &str) -> Vec<String> {
    HOOK_EVENTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|event| event.contains(tag))
        .cloned()
        .collect()
}

fn name_of(document: &Document) -> &str {
    document
        .source()
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn names_of(documents: &[Document]) -> String {
    documents.iter().map(name_of).collect::<Vec<_>>().join(",")
}

fn author_may_delete(user: &User, document: &Document, _data: &Value) -> bool {
    document
        .source()
        .get("author")
        .and_then(Value::as_str)
        .is_some_and(|author| author == user.id)
}

impl ModelKind for JournalKind {
    fn name(&self) -> &'static str {
        "JournalEntry"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("name").required(),
            Field::string("author").nullable(),
            Field::string("text"),
            Field::boolean("locked"),
            Field::ownership(),
            Field::flags(),
        ])
    }
}

#[async_trait]
impl DocumentKind for JournalKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &JOURNAL_METADATA
    }

    async fn pre_create(
        &self,
        document: &mut Document,
        _data: &Value,
        _operation: &DatabaseOperation,
        user: &User,
    ) -> Result<bool, DocumentError> {
        let name = name_of(document).to_string();
        record("pre_create", &name);
        if name.starts_with("veto") {
            return Ok(false);
        }

        // the pending document records its author and becomes theirs
        document.update_source(
            json!({ "author": user.id, "ownership": { user.id.as_str(): 3 } }),
            UpdateOptions::default(),
        )?;

        Ok(true)
    }

    async fn pre_create_operation(
        &self,
        documents: &mut Vec<Document>,
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        record("pre_create_operation", &names_of(documents));

        Ok(!documents.iter().any(|document| name_of(document) == "abort batch"))
    }

    async fn on_create_operation(
        &self,
        documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        record("on_create_operation", &names_of(documents));
        Ok(())
    }

    async fn on_create(
        &self,
        document: &Document,
        _data: &Source,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        record("on_create", name_of(document));
        Ok(())
    }

    async fn pre_update(
        &self,
        document: &Document,
        _changes: &mut Value,
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        record("pre_update", name_of(document));
        Ok(true)
    }

    async fn pre_update_operation(
        &self,
        documents: &[Document],
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        record("pre_update_operation", &names_of(documents));

        Ok(!documents.iter().any(|document| {
            document.source().get("locked") == Some(&Value::Bool(true))
        }))
    }

    async fn on_update_operation(
        &self,
        documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        record("on_update_operation", &names_of(documents));
        Ok(())
    }

    async fn on_update(
        &self,
        document: &Document,
        _changed: &Source,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        record("on_update", name_of(document));
        Ok(())
    }

    async fn pre_delete(
        &self,
        document: &Document,
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        record("pre_delete", name_of(document));

        Ok(!name_of(document).starts_with("keep"))
    }

    async fn pre_delete_operation(
        &self,
        documents: &[Document],
        _operation: &mut DatabaseOperation,
        _user: &User,
    ) -> Result<bool, DocumentError> {
        record("pre_delete_operation", &names_of(documents));
        Ok(true)
    }

    async fn on_delete_operation(
        &self,
        documents: &[Document],
        _operation: &DatabaseOperation,
        _user: &User,
    ) -> Result<(), DocumentError> {
        record("on_delete_operation", &names_of(documents));
        Ok(())
    }

    async fn on_delete(
        &self,
        document: &Document,
        _operation: &DatabaseOperation,
        _user_id: &str,
    ) -> Result<(), DocumentError> {
        record("on_delete", name_of(document));
        Ok(())
    }
}
