use super::*;
use crate::test_support::{ACTOR, CREATURE};
use proptest::prelude::*;
use serde_json::json;

fn creature(data: Value) -> DataModel {
    DataModel::new(&CREATURE, data, ModelOptions::default()).unwrap()
}

fn actor(data: Value) -> DataModel {
    DataModel::new(&ACTOR, data, ModelOptions::default()).unwrap()
}

fn ayla() -> DataModel {
    actor(json!({"_id": "ayla0001", "name": "Ayla"}))
}

// ======================================================================
// Construction
// ======================================================================

#[test]
fn construction_cleans_and_initializes() {
    let model = creature(json!({"name": "Wolf", "hp": {"value": "5", "max": 10}}));

    assert_eq!(model.source()["hp"], json!({"value": 5, "max": 10}));
    assert_eq!(model.get("hp.value"), Some(json!(5)));
    assert_eq!(model.get("tags"), Some(json!([])));
    assert!(!model.invalid());
}

#[test]
fn strict_construction_rejects_invalid_data() {
    let err = DataModel::new(&CREATURE, json!({"name": ""}), ModelOptions::default()).unwrap_err();
    let validation = err.validation().unwrap();

    assert_eq!(validation.model, "Creature");
    assert!(!validation.joint);
    assert_eq!(
        validation.failure.issues()["name"],
        vec!["may not be a blank string".to_string()]
    );
}

#[test]
fn lenient_construction_records_failures() {
    let model = DataModel::new(&CREATURE, json!({"name": ""}), ModelOptions::lenient()).unwrap();

    assert!(model.invalid());
    assert!(model.validation_failures().fields.is_some());
    assert!(model.validation_failures().joint.is_none());
}

#[test]
fn fallback_construction_repairs_invalid_values() {
    let model = DataModel::new(
        &ACTOR,
        json!({"name": "Ayla", "hp": {"value": -4}}),
        ModelOptions::default().with_fallback(),
    )
    .unwrap();

    assert_eq!(model.get("hp.value"), Some(json!(10)));
    assert!(!model.invalid());
    assert!(model.validation_failures().fields.is_some());
}

#[test]
fn non_object_data_starts_from_an_empty_record() {
    let model = DataModel::new(&CREATURE, json!(5), ModelOptions::lenient()).unwrap();

    assert_eq!(model.get("name"), Some(Value::Null));
    assert!(model.invalid());
}

#[test]
fn joint_failure_is_reported_separately() {
    let err = DataModel::new(
        &CREATURE,
        json!({"name": "Wolf", "hp": {"value": 11, "max": 10}}),
        ModelOptions::default(),
    )
    .unwrap_err();
    let validation = err.validation().unwrap();

    assert!(validation.joint);
    assert_eq!(
        validation.failure.message.as_deref(),
        Some("Creature joint validation error: hp.value may not exceed hp.max")
    );
}

#[test]
fn generated_child_ids_are_written_back_to_source() {
    let model = actor(json!({"name": "Ayla", "items": [{"name": "Rope"}]}));

    let id = model.source()["items"][0]["_id"].as_str().unwrap().to_string();
    assert!(crate::field::is_valid_id(&id));
    assert!(model.collection("items").unwrap().contains(&id));
}

// ======================================================================
// Migration and shims
// ======================================================================

#[test]
fn legacy_fields_are_migrated_before_cleaning() {
    let model = actor(json!({
        "name": "Old",
        "data": {"level": 2, "xp": 5},
        "hitPoints": {"value": 4, "max": 8},
    }));

    assert_eq!(model.source()["system"], json!({"level": 2, "xp": 5}));
    assert_eq!(model.source()["hp"], json!({"value": 4, "max": 8}));
    assert!(!model.source().contains_key("data"));
}

#[test]
fn failed_migration_does_not_abort_construction() {
    let model = actor(json!({"name": "Broken", "corrupt": true}));

    assert_eq!(model.get("name"), Some(json!("Broken")));
    assert!(!model.source().contains_key("corrupt"));
}

#[test]
fn migrate_helpers_move_and_default_paths() {
    let mut source = json!({"legacy": {"a": 1}, "keep": 2})
        .as_object()
        .cloned()
        .unwrap();

    assert!(migrate::rename_field(&mut source, "legacy.a", "current.b"));
    assert!(!migrate::rename_field(&mut source, "missing", "other"));
    assert!(migrate::apply_default(&mut source, "current.c", json!(3)));
    assert!(!migrate::apply_default(&mut source, "keep", json!(0)));
    assert!(migrate::migrate_field_with(&mut source, "keep", "kept", |v| json!(v.as_i64().unwrap() * 10)));

    assert_eq!(
        Value::Object(source),
        json!({"legacy": {}, "current": {"b": 1, "c": 3}, "kept": 20})
    );
}

#[test]
fn blocked_migrations_keep_the_legacy_value() {
    let mut source = json!({"legacy": {"a": 1}, "current": "flat", "hp": 3})
        .as_object()
        .cloned()
        .unwrap();

    assert!(!migrate::rename_field(&mut source, "legacy.a", "current.b"));
    assert_eq!(
        Value::Object(source.clone()),
        json!({"legacy": {"a": 1}, "current": "flat", "hp": 3})
    );

    // the legacy value itself may be what stood in the way
    assert!(migrate::rename_field(&mut source, "hp", "hp.value"));
    assert_eq!(source.get("hp"), Some(&json!({"value": 3})));
}

#[test]
fn shim_paths_read_the_current_field() {
    let model = ayla();

    assert_eq!(model.get("data.level"), Some(json!(1)));
    assert_eq!(model.get("data"), model.get("system"));
}

// ======================================================================
// Instance view
// ======================================================================

#[test]
fn getters_are_computed_and_not_serialized() {
    let model = ayla();

    assert_eq!(model.get("label"), Some(json!("Ayla (hero)")));

    let object = model.to_object(false);
    assert!(object.get("label").is_none());
    assert_eq!(object["items"], json!([]));
}

#[test]
fn set_assigns_instance_values_only() {
    let mut model = ayla();

    model.set("name", json!("Renamed")).unwrap();
    assert_eq!(model.get("name"), Some(json!("Renamed")));
    assert_eq!(model.source()["name"], json!("Ayla"));

    assert!(matches!(
        model.set("label", json!("x")),
        Err(ModelError::NotSettable { .. })
    ));
    assert!(matches!(
        model.set("items", json!([])),
        Err(ModelError::NotSettable { .. })
    ));
    assert!(matches!(
        model.set("_id", json!("other")),
        Err(ModelError::NotSettable { .. })
    ));
}

#[test]
fn reset_discards_instance_assignments() {
    let mut model = ayla();
    model.set("name", json!("Renamed")).unwrap();

    model.reset();

    assert_eq!(model.get("name"), Some(json!("Ayla")));
}

#[test]
fn to_object_with_source_copies_the_source() {
    let model = ayla();

    assert_eq!(model.to_object(true), Value::Object(model.source().clone()));
    assert_eq!(serde_json::to_value(&model).unwrap(), model.to_object(true));
}

#[test]
fn clone_with_merges_known_keys_only() {
    let model = ayla();

    let copy = model
        .clone_with(json!({"name": "Copy", "bogus": 1}), ModelOptions::default())
        .unwrap();

    assert_eq!(copy.get("name"), Some(json!("Copy")));
    assert!(!copy.source().contains_key("bogus"));
    assert_eq!(model.get("name"), Some(json!("Ayla")));
}

// ======================================================================
// Validation
// ======================================================================

#[test]
fn field_and_joint_validation_are_independent() {
    let mut model = DataModel::new(
        &CREATURE,
        json!({"name": "Wolf", "hp": {"value": 11, "max": 10}}),
        ModelOptions::lenient(),
    )
    .unwrap();
    assert!(model.invalid());
    assert!(model.validation_failures().joint.is_some());

    let fields_only = model
        .validate(ValidateOptions {
            joint: Some(false),
            ..ValidateOptions::default()
        })
        .unwrap();
    assert!(fields_only);

    let joint_only = model
        .validate(ValidateOptions {
            fields: false,
            joint: Some(true),
            strict: false,
            ..ValidateOptions::default()
        })
        .unwrap();
    assert!(!joint_only);
}

#[test]
fn joint_validation_cannot_run_on_changes() {
    let mut model = ayla();

    let err = model
        .validate(ValidateOptions {
            changes: Some(json!({"name": "B"})),
            joint: Some(true),
            ..ValidateOptions::default()
        })
        .unwrap_err();

    assert!(matches!(err, ModelError::JointWithChanges));
}

#[test]
fn non_strict_change_validation_reports_without_failing() {
    let mut model = ayla();

    let valid = model
        .validate(ValidateOptions {
            changes: Some(json!({"hp.value": "x"})),
            strict: false,
            ..ValidateOptions::default()
        })
        .unwrap();

    assert!(!valid);
    assert_eq!(model.source()["hp"]["value"], json!(10));
}

#[test]
fn validate_changes_returns_the_cleaned_change_set() {
    let model = ayla();

    let changes = model
        .validate_changes(json!({"hp.value": "7", "name": " Bo "}), false)
        .unwrap();

    assert_eq!(Value::Object(changes), json!({"hp": {"value": 7}, "name": "Bo"}));
}

#[test]
fn validate_changes_rejects_non_objects() {
    let model = ayla();

    let err = model.validate_changes(json!([1, 2]), false).unwrap_err();

    assert!(matches!(
        err,
        ModelError::ChangesNotObject {
            model: "Actor",
            actual: "array"
        }
    ));
}

// ======================================================================
// update_source
// ======================================================================

#[test]
fn update_applies_dotted_changes_and_returns_minimal_diff() {
    let mut model = ayla();

    let diff = model
        .update_source(json!({"hp.value": 3}), UpdateOptions::default())
        .unwrap();

    assert_eq!(Value::Object(diff), json!({"hp": {"value": 3}}));
    assert_eq!(model.get("hp.value"), Some(json!(3)));
    assert_eq!(model.get("hp.max"), Some(json!(10)));
}

#[test]
fn invalid_update_leaves_the_model_unchanged() {
    let mut model = ayla();
    let before = model.source().clone();

    let err = model
        .update_source(json!({"hp.value": "not-a-number"}), UpdateOptions::default())
        .unwrap_err();

    assert!(err.validation().is_some());
    assert_eq!(model.source(), &before);
    assert_eq!(model.get("hp.value"), Some(json!(10)));
}

#[test]
fn repeating_an_update_yields_an_empty_diff() {
    let mut model = ayla();
    let changes = json!({"name": "Bo", "hp": {"max": 12}});

    let first = model
        .update_source(changes.clone(), UpdateOptions::default())
        .unwrap();
    let second = model.update_source(changes, UpdateOptions::default()).unwrap();

    assert!(!first.is_empty());
    assert!(second.is_empty());
}

#[test]
fn joint_failure_after_apply_rolls_back_every_field() {
    let mut model = ayla();
    let before = model.source().clone();

    let err = model
        .update_source(json!({"name": "Bo", "hp.value": 50}), UpdateOptions::default())
        .unwrap_err();

    assert!(err.validation().is_some_and(|validation| validation.joint));
    assert_eq!(model.source(), &before);
    assert_eq!(model.get("name"), Some(json!("Ayla")));
}

#[test]
fn readonly_fields_cannot_be_reassigned() {
    let mut model = ayla();

    let err = model
        .update_source(json!({"_id": "other001"}), UpdateOptions::default())
        .unwrap_err();

    assert!(matches!(err, ModelError::Readonly { model: "Actor", .. }));
    assert_eq!(model.source_id(), Some("ayla0001"));
}

#[test]
fn readonly_fields_may_be_assigned_once() {
    let mut model = actor(json!({"name": "New"}));

    model
        .update_source(json!({"_id": "fresh001"}), UpdateOptions::default())
        .unwrap();

    assert_eq!(model.source_id(), Some("fresh001"));
}

#[test]
fn dry_run_returns_the_diff_without_applying_it() {
    let mut model = ayla();

    let diff = model
        .update_source(json!({"name": "Bo"}), UpdateOptions::dry_run())
        .unwrap();

    assert_eq!(Value::Object(diff), json!({"name": "Bo"}));
    assert_eq!(model.get("name"), Some(json!("Ayla")));
}

#[test]
fn free_form_objects_merge_and_honour_deletions() {
    let mut model = creature(json!({"name": "Wolf", "notes": {"a": 1, "b": 2}}));

    let diff = model
        .update_source(json!({"notes": {"c": 3, "-=a": null}}), UpdateOptions::default())
        .unwrap();

    assert_eq!(model.source()["notes"], json!({"b": 2, "c": 3}));
    assert_eq!(Value::Object(diff), json!({"notes": {"c": 3, "-=a": null}}));
}

#[test]
fn replace_overwrites_free_form_objects() {
    let mut model = creature(json!({"name": "Wolf", "notes": {"a": 1}}));

    model
        .update_source(json!({"notes": {"b": 2}}), UpdateOptions::replace())
        .unwrap();

    assert_eq!(model.source()["notes"], json!({"b": 2}));
}

#[test]
fn switching_type_replaces_type_data() {
    let mut model = ayla();

    let diff = model
        .update_source(json!({"type": "npc", "system": {"cr": 3}}), UpdateOptions::default())
        .unwrap();

    assert_eq!(model.source()["system"], json!({"cr": 3}));
    assert_eq!(diff["type"], json!("npc"));
    assert_eq!(model.get("label"), Some(json!("Ayla (npc)")));
}

#[test]
fn type_data_changes_merge_within_the_current_variant() {
    let mut model = ayla();

    let diff = model
        .update_source(json!({"system.level": 2, "system.xp": 300}), UpdateOptions::default())
        .unwrap();

    assert_eq!(model.source()["system"], json!({"level": 2, "xp": 300}));
    assert_eq!(Value::Object(diff), json!({"system": {"level": 2, "xp": 300}}));
}

#[test]
fn nested_joint_rule_blocks_the_update() {
    let mut model = ayla();

    let err = model
        .update_source(json!({"system.level": 4}), UpdateOptions::default())
        .unwrap_err();

    assert!(err.validation().is_some_and(|validation| validation.joint));
    assert_eq!(model.get("system.level"), Some(json!(1)));
}

// ======================================================================
// Embedded collections and singletons
// ======================================================================

fn outfitted() -> DataModel {
    actor(json!({
        "_id": "ayla0001",
        "name": "Ayla",
        "items": [{"_id": "rope0001", "name": "Rope"}],
        "portrait": {"_id": "port0001", "src": "ayla.png"},
    }))
}

#[test]
fn keyed_collection_changes_create_and_remove_children() {
    let mut model = outfitted();

    let diff = model
        .update_source(
            json!({"items": {"torch001": {"name": "Torch"}, "-=rope0001": null}}),
            UpdateOptions::default(),
        )
        .unwrap();

    let items = &diff["items"];
    assert_eq!(items["-=rope0001"], Value::Null);
    assert_eq!(items["torch001"]["name"], json!("Torch"));
    assert_eq!(items["torch001"]["quantity"], json!(1));

    let collection = model.collection("items").unwrap();
    assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["torch001"]);
    assert_eq!(model.source()["items"].as_array().map(Vec::len), Some(1));
}

#[test]
fn keyed_collection_changes_update_children_in_place() {
    let mut model = outfitted();

    let diff = model
        .update_source(
            json!({"items.rope0001.quantity": 3}),
            UpdateOptions::default(),
        )
        .unwrap();

    assert_eq!(Value::Object(diff), json!({"items": {"rope0001": {"quantity": 3}}}));
    let rope = model.collection("items").unwrap().get("rope0001").unwrap();
    assert_eq!(rope.get("quantity"), Some(json!(3)));
}

#[test]
fn array_collection_changes_upsert_by_id() {
    let mut model = outfitted();

    model
        .update_source(
            json!({"items": [{"_id": "torch001", "name": "Torch"}]}),
            UpdateOptions::default(),
        )
        .unwrap();

    let ids: Vec<&str> = model.collection("items").unwrap().ids().collect();
    assert_eq!(ids, vec!["rope0001", "torch001"]);
}

#[test]
fn non_recursive_array_changes_drop_unlisted_children() {
    let mut model = outfitted();

    let diff = model
        .update_source(
            json!({"items": [{"_id": "torch001", "name": "Torch"}]}),
            UpdateOptions::replace(),
        )
        .unwrap();

    assert_eq!(diff["items"]["-=rope0001"], Value::Null);
    let ids: Vec<&str> = model.collection("items").unwrap().ids().collect();
    assert_eq!(ids, vec!["torch001"]);
}

#[test]
fn array_collection_changes_require_ids() {
    let mut model = outfitted();
    let before = model.source().clone();

    let err = model
        .update_source(json!({"items": [{"name": "Nameless"}]}), UpdateOptions::default())
        .unwrap_err();

    assert!(matches!(err, ModelError::EmbeddedMissingId { field: "items" }));
    assert_eq!(model.source(), &before);
}

#[test]
fn invalid_child_changes_fail_the_parent_update() {
    let mut model = outfitted();
    let before = model.source().clone();

    let err = model
        .update_source(json!({"items.rope0001.quantity": -1}), UpdateOptions::default())
        .unwrap_err();

    assert!(err.validation().is_some());
    assert_eq!(model.source(), &before);
    let rope = model.collection("items").unwrap().get("rope0001").unwrap();
    assert_eq!(rope.get("quantity"), Some(json!(1)));
}

#[test]
fn singleton_changes_update_the_child() {
    let mut model = outfitted();

    let diff = model
        .update_source(json!({"portrait.scale": 2}), UpdateOptions::default())
        .unwrap();

    assert_eq!(Value::Object(diff), json!({"portrait": {"scale": 2}}));
    assert_eq!(model.singleton("portrait").unwrap().get("scale"), Some(json!(2)));
    assert_eq!(model.source()["portrait"]["scale"], json!(2));
}

#[test]
fn singleton_changes_without_a_child_must_build_a_valid_one() {
    let mut model = ayla();

    let err = model
        .update_source(json!({"portrait": {"scale": 2}}), UpdateOptions::default())
        .unwrap_err();

    assert!(matches!(err, ModelError::Embedded { field: "portrait", .. }));
    assert!(err.validation().is_some());
    assert_eq!(model.source()["portrait"], Value::Null);
    assert!(model.singleton("portrait").is_none());
}

#[test]
fn singleton_changes_without_a_child_create_it() {
    let mut model = ayla();

    let diff = model
        .update_source(
            json!({"portrait": {"_id": "port0001", "src": " ayla.png ", "scale": "2"}}),
            UpdateOptions::default(),
        )
        .unwrap();
    let portrait = model.singleton("portrait").unwrap();

    assert_eq!(
        Value::Object(diff),
        json!({"portrait": {"_id": "port0001", "src": "ayla.png", "scale": 2}})
    );
    assert_eq!(model.source()["portrait"], Value::Object(portrait.source().clone()));
    assert!(!portrait.invalid());
    assert_eq!(portrait.id(), Some("port0001"));
}

#[test]
fn invalid_children_are_isolated_when_requested() {
    let model = DataModel::new(
        &ACTOR,
        json!({
            "name": "Ayla",
            "items": [
                {"_id": "good0001", "name": "Sword"},
                {"_id": "bad00001", "name": ""},
            ],
        }),
        ModelOptions::default().with_drop_invalid_embedded(),
    )
    .unwrap();
    let items = model.collection("items").unwrap();

    assert_eq!(items.len(), 1);
    assert!(items.get("bad00001").is_none());
    assert!(items.get_invalid("bad00001").is_some());
    assert!(items.invalid_ids().contains("bad00001"));
    assert_eq!(model.source()["items"].as_array().map(Vec::len), Some(2));
}

#[test]
fn invalid_children_fail_strict_construction() {
    let err = DataModel::new(
        &ACTOR,
        json!({"name": "Ayla", "items": [{"_id": "bad00001", "name": ""}]}),
        ModelOptions::default(),
    )
    .unwrap_err();

    assert!(err.validation().is_some());
}

// ======================================================================
// Properties
// ======================================================================

proptest! {
    #[test]
    fn source_round_trips_through_construction(
        name in "[A-Za-z][A-Za-z ]{0,11}[A-Za-z]",
        value in 0i64..=10,
    ) {
        let model = actor(json!({"name": name, "hp": {"value": value}}));
        let rebuilt = actor(model.to_object(true));

        prop_assert_eq!(rebuilt.source(), model.source());
    }

    #[test]
    fn applying_a_diff_again_changes_nothing(value in 0i64..=10, max in 10i64..=40) {
        let mut model = ayla();
        let diff = model
            .update_source(json!({"hp": {"value": value, "max": max}}), UpdateOptions::default())
            .unwrap();

        let again = model
            .update_source(Value::Object(diff), UpdateOptions::default())
            .unwrap();

        prop_assert!(again.is_empty());
    }

    #[test]
    fn failed_updates_are_atomic(name in "[A-Za-z]{1,12}", value in 11i64..=100) {
        let mut model = ayla();
        let before = model.source().clone();

        let outcome = model.update_source(
            json!({"name": name, "hp.value": value}),
            UpdateOptions::default(),
        );

        prop_assert!(outcome.is_err());
        prop_assert_eq!(model.source(), &before);
    }
}
