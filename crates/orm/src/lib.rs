//! # elif-lite-orm: embedded SQLite ORM
//!
//! Entities describe themselves once through an [`EntityDescriptor`]. From
//! the registered descriptors the crate synthesizes a relational schema,
//! migrates the database file to it by version, renders association-aware
//! queries and runs cascading store, delete and query operations, each in
//! its own transaction.
//!
//! ```no_run
//! use elif_lite_orm::{Database, DatabaseConfig, EntityRegistry};
//! # fn demo(registry: EntityRegistry) -> elif_lite_orm::ModelResult<()> {
//! let db = Database::open(DatabaseConfig::new("app").with_path("app.db"), registry)?;
//! println!("{} tables", db.schema().len());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod converter;
pub mod database;
pub mod entity;
pub mod error;
pub mod migrations;
pub mod naming;
pub mod query;
pub mod repository;
pub mod schema;
pub mod security;
pub mod transaction;

pub use backends::{DatabaseRow, DatabaseValue, SqlExecutor, SqliteExecutor};
pub use config::DatabaseConfig;
pub use converter::{EntityConverter, ResultColumn, ResultSet};
pub use database::Database;
pub use entity::{
    Cascade, Entity, EntityDescriptor, EntityRegistry, Fetch, FieldDescriptor, FieldRole, FieldType,
    IndexDescriptor, Relation, RelationKind,
};
pub use error::{ModelError, ModelResult, OrmError, OrmResult};
pub use migrations::{
    FileSnapshotStore, MemorySnapshotStore, MigrationDirection, MigrationMode, MigrationRunResult,
    SchemaMigrator, SnapshotKey, SnapshotStore,
};
pub use query::{
    AssociationProcessor, JoinKeys, JoinMode, OrderDirection, PredicateBuilder, Query, QueryProcessor, Root,
};
pub use repository::{EntityRepository, Repository};
pub use schema::factory::SchemaFactory;
pub use schema::{Column, Constraint, DdlMode, Reference, Schema, SqlType, Table};
pub use transaction::{
    DeleteTransaction, PendingTransaction, QueryTransaction, StoreOutcome, StoreTransaction, Transaction,
    TransactionTemplate,
};
