//! Database Backend Abstractions
//!
//! The engine talks to storage only through [`SqlExecutor`]. The SQLite
//! implementation lives in [`sqlite`].

pub mod core;
pub mod sqlite;

// Re-export core traits and types
pub use self::core::*;
pub use sqlite::SqliteExecutor;
