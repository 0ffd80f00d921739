//! Migration System
//!
//! Schema versions are tracked with SQLite's `user_version` pragma. Every
//! open stores a JSON snapshot of the schema under `(database, version)`;
//! upgrades and downgrades diff against those snapshots.

pub mod definitions;
pub mod runner;
pub mod snapshot;

pub use definitions::{MigrationDirection, MigrationMode, MigrationRunResult, SnapshotKey};
pub use runner::SchemaMigrator;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
