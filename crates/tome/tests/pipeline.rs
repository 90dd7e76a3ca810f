use tome::{
    db::{BackendConfig, InMemoryBackend},
    document::Permissions,
    prelude::*,
};

///
/// Note
///

struct NoteKind;

static NOTE: NoteKind = NoteKind;

static NOTE_METADATA: DocumentMetadata = DocumentMetadata {
    name: "Note",
    collection: "notes",
    embedded: &[("Task", "tasks")],
    has_type_data: false,
    permissions: Permissions::DEFAULT,
};

impl ModelKind for NoteKind {
    fn name(&self) -> &'static str {
        "Note"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("title").required(),
            Field::boolean("pinned"),
            Field::number("priority").integer().min(0.0).initial(json!(0)),
            Field::embedded_collection("tasks", &TASK),
            Field::ownership(),
        ])
    }
}

impl DocumentKind for NoteKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &NOTE_METADATA
    }
}

///
/// Task
///

struct TaskKind;

static TASK: TaskKind = TaskKind;

static TASK_METADATA: DocumentMetadata = DocumentMetadata::new("Task", "tasks");

impl ModelKind for TaskKind {
    fn name(&self) -> &'static str {
        "Task"
    }

    fn define_schema(&self) -> Schema {
        Schema::new([
            Field::document_id(),
            Field::string("text").required(),
            Field::boolean("done"),
        ])
    }
}

impl DocumentKind for TaskKind {
    fn metadata(&self) -> &'static DocumentMetadata {
        &TASK_METADATA
    }
}

fn database() -> Database {
    Database::new(InMemoryBackend::new(BackendConfig::default()))
}

fn gm() -> User {
    User::new("gm0000000000001", "Gamemaster", UserRole::Gamemaster)
}

async fn create_note(db: &Database, data: Value) -> Document {
    Document::create(&NOTE, db, data, DatabaseOperation::new(), &gm())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn notes_round_trip_through_the_pipeline() {
    let db = database();
    let gm = gm();

    let note = create_note(&db, json!({"title": "  Shopping "})).await;
    let note_id = note.id().unwrap().to_string();
    assert_eq!(note.get("title"), Some(json!("Shopping")));
    assert_eq!(note.get("pinned"), Some(json!(false)));

    let task = note
        .create_embedded_documents(&db, "Task", vec![json!({"text": "milk"})], DatabaseOperation::new(), &gm)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(
        task.uuid(),
        Some(format!("Note.{note_id}.Task.{}", task.id().unwrap()))
    );

    let done = task
        .update(&db, json!({"done": true}), DatabaseOperation::new(), &gm)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.get("done"), Some(json!(true)));

    let pinned = note
        .update(&db, json!({"pinned": true}), DatabaseOperation::new(), &gm)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pinned.get("pinned"), Some(json!(true)));
    assert_eq!(pinned.collection("tasks").map(|tasks| tasks.len()), Some(1));

    let deleted = pinned.delete(&db, DatabaseOperation::new(), &gm).await.unwrap();
    assert_eq!(deleted.as_ref().and_then(Document::id), Some(note_id.as_str()));

    let remaining = db.get(&NOTE, &mut DatabaseOperation::new(), &gm).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn invalid_notes_are_rejected() {
    let db = database();

    let err = Document::create(&NOTE, &db, json!({"title": ""}), DatabaseOperation::new(), &gm())
        .await
        .unwrap_err();
    assert!(tome::Error::from(err).is_validation());

    let note = create_note(&db, json!({"title": "Chores"})).await;
    let err = note
        .update(&db, json!({"priority": -1}), DatabaseOperation::new(), &gm())
        .await
        .unwrap_err();
    assert!(tome::Error::from(err).is_validation());
}

#[tokio::test]
async fn players_need_ownership_to_see_notes() {
    let db = database();
    let player = User::new("player000000001", "Pat", UserRole::Player);
    create_note(&db, json!({"title": "Private"})).await;
    create_note(&db, json!({"title": "Shared", "ownership": {"default": 1}})).await;

    let visible = db
        .get(&NOTE, &mut DatabaseOperation::new(), &player)
        .await
        .unwrap()
        .into_documents();

    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].get("title"), Some(json!("Shared")));
}
