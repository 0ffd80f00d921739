//! Entities and helpers shared by the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use elif_lite_orm::{
    Cascade, Database, DatabaseConfig, DatabaseRow, Entity, EntityDescriptor, EntityRegistry, FieldDescriptor,
    FieldType, SqlExecutor, SqliteExecutor,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: i64,
    pub username: String,
    pub age: i64,
    pub class_rooms: Vec<ClassRoom>,
}

impl Entity for Person {
    const NAME: &'static str = "Person";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("username", FieldType::Text).indexed())
            .field(FieldDescriptor::column("age", FieldType::Integer))
            .field(
                FieldDescriptor::many_to_many::<ClassRoom>("class_rooms")
                    .cascade(Cascade::All)
                    .eager(),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRoom {
    pub id: i64,
    pub name: String,
}

impl Entity for ClassRoom {
    const NAME: &'static str = "ClassRoom";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub person: Option<Box<Person>>,
}

impl Entity for Group {
    const NAME: &'static str = "Group";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
            .field(FieldDescriptor::many_to_one::<Person>("person").cascade(Cascade::Store))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub books: Vec<Book>,
}

impl Entity for Author {
    const NAME: &'static str = "Author";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
            .field(
                FieldDescriptor::one_to_many::<Book>("books")
                    .cascade(Cascade::All)
                    .eager(),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub published: bool,
    pub author: Option<Box<Author>>,
}

impl Entity for Book {
    const NAME: &'static str = "Book";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("title", FieldType::Text))
            .field(FieldDescriptor::column("published", FieldType::Boolean))
            .field(FieldDescriptor::many_to_one::<Author>("author").eager())
    }
}

/// Owner of a unidirectional one-to-many
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub shelves: Vec<Shelf>,
}

impl Entity for Library {
    const NAME: &'static str = "Library";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
            .field(FieldDescriptor::one_to_many::<Shelf>("shelves").cascade(Cascade::All))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shelf {
    pub id: i64,
    pub label: String,
}

impl Entity for Shelf {
    const NAME: &'static str = "Shelf";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("label", FieldType::Text))
    }
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .register::<Person>()
        .register::<ClassRoom>()
        .register::<Group>()
        .register::<Author>()
        .register::<Book>()
        .register::<Library>()
        .register::<Shelf>()
}

/// A file-backed database in a fresh temporary directory
pub struct TestDb {
    pub db: Database,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestDb {
    pub fn open() -> Self {
        Self::open_with(registry())
    }

    pub fn open_with(registry: EntityRegistry) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let config = DatabaseConfig::new("test")
            .with_path(&path)
            .with_snapshot_dir(dir.path());
        let db = Database::open(config, registry).unwrap();
        Self { db, path, _dir: dir }
    }

    /// Run SQL on a second connection to inspect the file
    pub fn raw(&self, sql: &str) -> Vec<DatabaseRow> {
        raw(&self.path, sql)
    }

    pub fn count_rows(&self, table: &str) -> usize {
        self.raw(&format!("SELECT * FROM \"{}\"", table)).len()
    }
}

/// Route engine logs to the test output; `RUST_LOG=debug` shows the SQL
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn raw(path: &Path, sql: &str) -> Vec<DatabaseRow> {
    let mut executor = SqliteExecutor::open(path).unwrap();
    executor.query(sql, &[]).unwrap()
}

pub fn int(row: &DatabaseRow, column: &str) -> Option<i64> {
    row.get(column).and_then(|v| v.as_i64())
}

pub fn person(username: &str, age: i64) -> Person {
    Person {
        username: username.to_string(),
        age,
        ..Default::default()
    }
}

pub fn room(name: &str) -> ClassRoom {
    ClassRoom {
        name: name.to_string(),
        ..Default::default()
    }
}
