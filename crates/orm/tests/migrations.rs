mod common;

use std::path::Path;

use common::{int, raw};
use elif_lite_orm::{
    Database, DatabaseConfig, EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType, MigrationDirection,
    MigrationMode, ModelError,
};
use serde_json::json;
use tempfile::TempDir;

fn notes_v1() -> EntityRegistry {
    EntityRegistry::new().with_descriptor(
        EntityDescriptor::new("Note")
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("body", FieldType::Text)),
    )
}

fn notes_v2() -> EntityRegistry {
    EntityRegistry::new()
        .with_descriptor(
            EntityDescriptor::new("Note")
                .field(FieldDescriptor::id("id"))
                .field(FieldDescriptor::column("body", FieldType::Text))
                .field(FieldDescriptor::column("pinned", FieldType::Boolean).indexed()),
        )
        .with_descriptor(
            EntityDescriptor::new("Tag")
                .field(FieldDescriptor::id("id"))
                .field(FieldDescriptor::column("label", FieldType::Text)),
        )
}

fn config(dir: &Path, version: u32) -> DatabaseConfig {
    DatabaseConfig::new("notes")
        .with_path(dir.join("notes.db"))
        .with_snapshot_dir(dir)
        .with_version(version)
}

fn add_note(db: &Database, body: &str) {
    let mut objects = vec![json!({ "body": body }).as_object().cloned().unwrap()];
    assert!(db.store_objects("Note", &mut objects).unwrap()[0].is_stored());
}

fn note_count(dir: &Path) -> usize {
    raw(&dir.join("notes.db"), "SELECT _id FROM note").len()
}

#[test]
fn test_fresh_open_creates_and_snapshots() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(dir.path(), 1), notes_v1()).unwrap();

    assert_eq!(db.migration().direction, MigrationDirection::Create);
    assert_eq!(db.migration().from_version, 0);
    assert!(dir.path().join("notes_1.schema.json").exists());

    let version = raw(&dir.path().join("notes.db"), "PRAGMA user_version");
    assert_eq!(int(&version[0], "user_version"), Some(1));
}

#[test]
fn test_reopen_same_version_is_unchanged() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open(config(dir.path(), 1), notes_v1()).unwrap();
        add_note(&db, "first");
    }
    let db = Database::open(config(dir.path(), 1), notes_v1()).unwrap();
    assert_eq!(db.migration().direction, MigrationDirection::Unchanged);
    assert!(db.migration().statements.is_empty());
    assert_eq!(note_count(dir.path()), 1);
}

#[test]
fn test_update_upgrade_alters_in_place() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open(config(dir.path(), 1), notes_v1()).unwrap();
        add_note(&db, "keep me");
    }

    let db = Database::open(config(dir.path(), 2), notes_v2()).unwrap();
    let migration = db.migration();
    assert_eq!(migration.direction, MigrationDirection::Upgrade);
    assert!(migration
        .statements
        .iter()
        .any(|s| s == "ALTER TABLE note ADD COLUMN pinned NUMERIC;"));
    assert!(migration.statements.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS tag")));
    assert!(migration.statements.iter().any(|s| s.contains("idx_note_pinned")));

    assert_eq!(note_count(dir.path()), 1);
    add_note(&db, "second");
    assert_eq!(note_count(dir.path()), 2);
}

#[test]
fn test_create_mode_upgrade_rebuilds() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open(config(dir.path(), 1), notes_v1()).unwrap();
        add_note(&db, "dropped");
    }

    let db = Database::open(
        config(dir.path(), 2).with_migration_mode(MigrationMode::Create),
        notes_v2(),
    )
    .unwrap();
    assert_eq!(db.migration().direction, MigrationDirection::Upgrade);
    assert_eq!(db.migration().statements[0], "DROP TABLE IF EXISTS note;");
    assert_eq!(note_count(dir.path()), 0);
}

#[test]
fn test_downgrade_requires_opt_in() {
    let dir = TempDir::new().unwrap();
    {
        Database::open(config(dir.path(), 1), notes_v1()).unwrap();
    }
    {
        Database::open(config(dir.path(), 2), notes_v2()).unwrap();
    }

    let refused = Database::open(config(dir.path(), 1), notes_v1());
    assert!(matches!(refused, Err(ModelError::Downgrade { from: 2, to: 1 })));

    let db = Database::open(config(dir.path(), 1).with_rollback_on_downgrade(true), notes_v1()).unwrap();
    assert_eq!(db.migration().direction, MigrationDirection::Downgrade);

    let tables = raw(
        &dir.path().join("notes.db"),
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'tag'",
    );
    assert!(tables.is_empty());
    let version = raw(&dir.path().join("notes.db"), "PRAGMA user_version");
    assert_eq!(int(&version[0], "user_version"), Some(1));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Database::open(config(dir.path(), 0), notes_v1());
    assert!(matches!(result, Err(ModelError::Configuration(_))));
}

#[test]
fn test_schema_error_leaves_no_database_file() {
    let dir = TempDir::new().unwrap();
    let registry = EntityRegistry::new()
        .with_descriptor(EntityDescriptor::new("Select").field(FieldDescriptor::id("id")));

    let result = Database::open(config(dir.path(), 1), registry);
    assert!(matches!(result, Err(ModelError::SchemaInit(_))));
    assert!(!dir.path().join("notes.db").exists());
}
