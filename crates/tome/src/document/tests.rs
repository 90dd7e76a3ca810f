use super::*;
use crate::{
    document::ownership::{Action, CompendiumOwnership, OwnershipLevel, User, UserRole},
    test_support::{ACTOR, EFFECT, JOURNAL, MONSTER_PACK, assistant, banned, gm, player},
};
use serde_json::json;
use std::collections::BTreeMap;

fn actor(data: Value) -> Document {
    Document::new(&ACTOR, data, DocumentOptions::default()).unwrap()
}

fn outfitted() -> Document {
    actor(json!({
        "_id": "ayla0001",
        "name": "Ayla",
        "ownership": {"default": 0, "owner001": 3},
        "items": [{
            "_id": "rope0001",
            "name": "Rope",
            "effects": [{"_id": "fx000001", "name": "Frayed"}],
        }],
        "portrait": {"_id": "port0001", "src": "ayla.png"},
    }))
}

fn scopes() -> Vec<String> {
    vec!["core".to_string(), "world".to_string()]
}

// ======================================================================
// Identity
// ======================================================================

#[test]
fn world_documents_are_addressed_by_name_and_id() {
    let document = outfitted();

    assert_eq!(document.id(), Some("ayla0001"));
    assert_eq!(document.uuid().as_deref(), Some("Actor.ayla0001"));
    assert_eq!(document.document_name(), "Actor");
    assert_eq!(document.collection_name(), "actors");
    assert!(!document.is_embedded());
    assert!(!document.in_compendium());
}

#[test]
fn compendium_documents_carry_the_pack_in_their_uuid() {
    let document = Document::new(
        &ACTOR,
        json!({"_id": "wolf0001", "name": "Wolf"}),
        DocumentOptions::default().in_pack(MONSTER_PACK),
    )
    .unwrap();

    assert_eq!(
        document.uuid().as_deref(),
        Some("Compendium.world.monsters.Actor.wolf0001")
    );
    assert!(document.in_compendium());
}

#[test]
fn unsaved_documents_have_no_uuid() {
    let document = actor(json!({"name": "Draft"}));

    assert_eq!(document.id(), None);
    assert_eq!(document.uuid(), None);
}

#[test]
fn identity_survives_updates() {
    let mut document = outfitted();

    document
        .update_source(json!({"name": "Renamed"}), UpdateOptions::default())
        .unwrap();
    let err = document
        .update_source(json!({"_id": "other001"}), UpdateOptions::default())
        .unwrap_err();

    assert!(matches!(err, ModelError::Readonly { .. }));
    assert_eq!(document.id(), Some("ayla0001"));
    assert_eq!(document.get("name"), Some(json!("Renamed")));
}

#[test]
fn first_assigned_id_is_adopted() {
    let mut document = actor(json!({"name": "Draft"}));

    document
        .update_source(json!({"_id": "late0001"}), UpdateOptions::default())
        .unwrap();

    assert_eq!(document.id(), Some("late0001"));
    assert_eq!(document.uuid().as_deref(), Some("Actor.late0001"));
}

#[test]
fn embedded_children_follow_a_newly_assigned_parent_id() {
    let mut document = actor(json!({"name": "Draft", "items": [{"_id": "rope0001", "name": "Rope"}]}));
    let rope = document.get_embedded_document("Item", "rope0001", false).unwrap();
    assert_eq!(rope.uuid(), None);

    document
        .update_source(json!({"_id": "late0001"}), UpdateOptions::default())
        .unwrap();

    let rope = document.get_embedded_document("Item", "rope0001", false).unwrap();
    assert_eq!(rope.uuid().as_deref(), Some("Actor.late0001.Item.rope0001"));
}

// ======================================================================
// Hierarchy
// ======================================================================

#[test]
fn embedded_documents_link_to_their_parent() {
    let document = outfitted();
    let rope = document.get_embedded_document("Item", "rope0001", false).unwrap();

    assert!(rope.is_embedded());
    assert_eq!(rope.parent_collection(), Some("items"));
    assert_eq!(rope.parent().map(|link| link.document_name), Some("Actor"));
    assert_eq!(rope.uuid().as_deref(), Some("Actor.ayla0001.Item.rope0001"));

    let frayed = rope.get_embedded_document("ActiveEffect", "fx000001", false).unwrap();
    assert_eq!(
        frayed.uuid().as_deref(),
        Some("Actor.ayla0001.Item.rope0001.ActiveEffect.fx000001")
    );
}

#[test]
fn embedded_documents_inherit_the_compendium_pack() {
    let document = Document::new(
        &ACTOR,
        json!({"_id": "wolf0001", "name": "Wolf", "items": [{"_id": "fang0001", "name": "Fang"}]}),
        DocumentOptions::default().in_pack(MONSTER_PACK),
    )
    .unwrap();
    let fang = document.get_embedded_document("Item", "fang0001", false).unwrap();

    assert_eq!(fang.pack(), Some(MONSTER_PACK));
    assert_eq!(
        fang.uuid().as_deref(),
        Some("Compendium.world.monsters.Actor.wolf0001.Item.fang0001")
    );
}

#[test]
fn singletons_are_found_by_name_and_id() {
    let document = outfitted();

    let portrait = document.get_embedded_document("Portrait", "port0001", false).unwrap();
    assert_eq!(portrait.parent_collection(), Some("portrait"));
    assert!(document.get_embedded_document("Portrait", "other001", false).is_none());
}

#[test]
fn children_created_by_update_are_linked() {
    let mut document = outfitted();

    document
        .update_source(json!({"items.torch001": {"name": "Torch"}}), UpdateOptions::default())
        .unwrap();

    let torch = document.get_embedded_document("Item", "torch001", false).unwrap();
    assert_eq!(torch.uuid().as_deref(), Some("Actor.ayla0001.Item.torch001"));
    assert_eq!(torch.parent().and_then(|link| link.id.as_deref()), Some("ayla0001"));
}

#[test]
fn unknown_embedded_names_are_rejected() {
    let document = outfitted();

    assert!(matches!(
        document.embedded_kind("Scene"),
        Err(DocumentError::UnknownEmbedded { .. })
    ));
    assert!(document.get_embedded_collection("Portrait").is_err());
    assert_eq!(document.get_embedded_collection("Item").unwrap().len(), 1);
    assert!(document.get_embedded_document("Scene", "x", true).is_none());
}

#[test]
fn invalid_children_are_only_returned_on_request() {
    let document = Document::new(
        &ACTOR,
        json!({
            "_id": "ayla0001",
            "name": "Ayla",
            "items": [{"_id": "bad00001", "name": ""}],
        }),
        DocumentOptions::default().with_model(ModelOptions::default().with_drop_invalid_embedded()),
    )
    .unwrap();

    assert!(document.get_embedded_document("Item", "bad00001", false).is_none());
    let bad = document.get_embedded_document("Item", "bad00001", true).unwrap();
    assert!(bad.invalid());
    assert!(document.get_embedded_collection("Item").unwrap().is_empty());
}

#[test]
fn clone_with_keeps_location() {
    let document = Document::new(
        &ACTOR,
        json!({"_id": "wolf0001", "name": "Wolf"}),
        DocumentOptions::default().in_pack(MONSTER_PACK),
    )
    .unwrap();

    let copy = document
        .clone_with(json!({"name": "Dire Wolf"}), ModelOptions::default())
        .unwrap();

    assert_eq!(copy.pack(), Some(MONSTER_PACK));
    assert_eq!(copy.id(), Some("wolf0001"));
    assert_eq!(copy.get("name"), Some(json!("Dire Wolf")));
}

#[test]
fn documents_serialize_as_their_source() {
    let document = outfitted();

    assert_eq!(serde_json::to_value(&document).unwrap(), document.to_object(true));
}

// ======================================================================
// Uuids
// ======================================================================

#[test]
fn parse_uuid_splits_world_and_compendium_addresses() {
    let packs = vec![MONSTER_PACK.to_string(), "world".to_string()];

    let world = parse_uuid("Actor.a1.Item.i1", &packs).unwrap();
    assert_eq!(world.pack, None);
    assert_eq!(
        world.path,
        vec![
            ("Actor".to_string(), "a1".to_string()),
            ("Item".to_string(), "i1".to_string()),
        ]
    );

    // the longest matching pack wins
    let pack = parse_uuid("Compendium.world.monsters.Actor.a1", &packs).unwrap();
    assert_eq!(pack.pack.as_deref(), Some(MONSTER_PACK));
    assert_eq!(pack.path, vec![("Actor".to_string(), "a1".to_string())]);
}

#[test]
fn parse_uuid_rejects_malformed_addresses() {
    let packs = vec![MONSTER_PACK.to_string()];

    assert!(parse_uuid("Actor", &packs).is_none());
    assert!(parse_uuid("Actor..Item.i1", &packs).is_none());
    assert!(parse_uuid("Compendium.unknown.Actor.a1", &packs).is_none());
}

// ======================================================================
// Ownership and permissions
// ======================================================================

#[test]
fn user_levels_come_from_the_ownership_map() {
    let document = actor(json!({
        "_id": "ayla0001",
        "name": "Ayla",
        "ownership": {"default": 1, "owner001": 3, "heir0001": -1},
    }));

    assert_eq!(document.get_user_level(&player("owner001")), OwnershipLevel::Owner);
    assert_eq!(document.get_user_level(&player("stranger")), OwnershipLevel::Limited);
    assert_eq!(document.get_user_level(&player("heir0001")), OwnershipLevel::Limited);
}

#[test]
fn embedded_documents_inherit_parent_ownership() {
    let document = outfitted();
    let rope = document.get_embedded_document("Item", "rope0001", false).unwrap();

    assert_eq!(rope.get_user_level(&player("owner001")), OwnershipLevel::Owner);
    assert_eq!(rope.get_user_level(&player("stranger")), OwnershipLevel::None);
}

#[test]
fn compendium_levels_are_role_based() {
    let document = Document::new(
        &ACTOR,
        json!({"_id": "wolf0001", "name": "Wolf", "ownership": {"default": 3}}),
        DocumentOptions::default().in_pack(MONSTER_PACK),
    )
    .unwrap();

    assert_eq!(document.get_user_level(&player("p1")), OwnershipLevel::Observer);
    assert_eq!(document.get_user_level(&assistant()), OwnershipLevel::Owner);

    let locked = CompendiumOwnership {
        roles: BTreeMap::from([(UserRole::Gamemaster, OwnershipLevel::Owner)]),
    };
    assert_eq!(document.get_user_level_in(&assistant(), &locked), OwnershipLevel::None);
}

#[test]
fn compendium_role_levels_govern_writes() {
    let document = Document::new(
        &ACTOR,
        json!({"_id": "wolf0001", "name": "Wolf"}),
        DocumentOptions::default().in_pack(MONSTER_PACK),
    )
    .unwrap();
    let open = CompendiumOwnership {
        roles: BTreeMap::from([(UserRole::Player, OwnershipLevel::Owner)]),
    };
    let data = Value::Null;

    assert!(!document.can_user_modify(&player("p1"), Action::Update, &data));
    assert!(document.can_user_modify_in(&player("p1"), Action::Update, &data, &open));
    assert!(document.test_user_permission_in(&player("p1"), OwnershipLevel::Owner, true, &open));
    assert!(!document.can_user_modify_in(&banned(), Action::Update, &data, &open));
}

#[test]
fn gamemasters_always_pass_and_banned_users_never_do() {
    let document = actor(json!({"_id": "ayla0001", "name": "Ayla", "ownership": {"default": 3}}));

    assert!(document.test_user_permission(&gm(), OwnershipLevel::Owner, true));
    assert!(!document.test_user_permission(&banned(), OwnershipLevel::None, false));
    assert!(document.test_user_permission(&player("p1"), OwnershipLevel::Owner, true));
    assert!(!document.test_user_permission(&player("p1"), OwnershipLevel::Observer, true));
}

#[test]
fn modify_rules_follow_the_document_kind() {
    let document = outfitted();
    let owner = player("owner001");
    let stranger = player("stranger");
    let data = Value::Null;

    assert!(document.can_user_modify(&stranger, Action::Create, &data));
    assert!(!document.can_user_modify(&banned(), Action::Create, &data));

    assert!(document.can_user_modify(&owner, Action::Update, &data));
    assert!(!document.can_user_modify(&stranger, Action::Update, &data));

    assert!(!document.can_user_modify(&owner, Action::Delete, &data));
    assert!(document.can_user_modify(&assistant(), Action::Delete, &data));
    assert!(document.can_user_modify(&gm(), Action::Delete, &data));

    assert!(!document.can_user_modify(&stranger, Action::Get, &data));
}

#[test]
fn embedded_lifecycle_requires_parent_ownership() {
    let document = outfitted();
    let rope = document.get_embedded_document("Item", "rope0001", false).unwrap();

    assert!(rope.can_user_modify(&player("owner001"), Action::Create, &Value::Null));
    assert!(rope.can_user_modify(&player("owner001"), Action::Delete, &Value::Null));
    assert!(!rope.can_user_modify(&player("stranger"), Action::Delete, &Value::Null));
}

#[test]
fn custom_permissions_receive_the_document() {
    let journal = Document::new(
        &JOURNAL,
        json!({"_id": "note0001", "name": "Note", "author": "author01"}),
        DocumentOptions::default(),
    )
    .unwrap();

    assert!(journal.can_user_modify(&player("author01"), Action::Delete, &Value::Null));
    assert!(!journal.can_user_modify(&player("reader01"), Action::Delete, &Value::Null));
}

#[test]
fn roles_and_levels_parse_case_insensitively() {
    assert_eq!("player".parse::<UserRole>(), Ok(UserRole::Player));
    assert_eq!("OWNER".parse::<OwnershipLevel>(), Ok(OwnershipLevel::Owner));
    assert!("wizard".parse::<UserRole>().is_err());

    let user = User::new("u1", "Una", UserRole::Trusted).with_permission("FILES_BROWSE");
    assert!(user.can("FILES_BROWSE"));
    assert!(!user.can("SETTINGS_MODIFY"));
    assert!(gm().can("SETTINGS_MODIFY"));
}

// ======================================================================
// Flags
// ======================================================================

fn journal() -> Document {
    Document::new(
        &JOURNAL,
        json!({"_id": "note0001", "name": "Note"}),
        DocumentOptions::default(),
    )
    .unwrap()
}

#[test]
fn flags_are_written_and_read_by_scope() {
    let mut document = journal();

    let diff = document
        .set_flag_source(&scopes(), "core", "sheet.mode", json!("dark"))
        .unwrap();

    assert_eq!(
        Value::Object(diff),
        json!({"flags": {"core": {"sheet": {"mode": "dark"}}}})
    );
    assert_eq!(
        document.get_flag(&scopes(), "core", "sheet.mode").unwrap(),
        Some(json!("dark"))
    );
    assert_eq!(document.get_flag(&scopes(), "world", "missing").unwrap(), None);
}

#[test]
fn flags_reject_inactive_scopes() {
    let mut document = journal();

    assert!(matches!(
        document.get_flag(&scopes(), "dnd5e", "x"),
        Err(DocumentError::InvalidFlagScope(scope)) if scope == "dnd5e"
    ));
    assert!(matches!(
        document.set_flag_source(&scopes(), "dnd5e", "x", json!(1)),
        Err(DocumentError::InvalidFlagScope(_))
    ));
}

#[test]
fn documents_without_flags_cannot_store_them() {
    let mut effect = Document::new(&EFFECT, json!({"name": "Blessed"}), DocumentOptions::default()).unwrap();

    assert!(matches!(
        effect.set_flag_source(&scopes(), "core", "x", json!(1)),
        Err(DocumentError::FlagsUnsupported {
            document_name: "ActiveEffect"
        })
    ));
    assert_eq!(effect.get_flag(&scopes(), "core", "x").unwrap(), None);
}
