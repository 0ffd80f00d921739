//! Migration Definitions - Core types shared by the migrator and snapshot stores

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How an upgrade reconciles an existing database with the new schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Drop every table of the previous version, then create from scratch
    Create,
    /// Create missing tables and add missing columns, keeping data
    #[default]
    Update,
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationMode::Create => write!(f, "create"),
            MigrationMode::Update => write!(f, "update"),
        }
    }
}

impl FromStr for MigrationMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(MigrationMode::Create),
            "update" => Ok(MigrationMode::Update),
            other => Err(ModelError::Configuration(format!(
                "unknown migration mode '{}', expected 'create' or 'update'",
                other
            ))),
        }
    }
}

/// Identifies one stored schema snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub database: String,
    pub version: u32,
}

impl SnapshotKey {
    pub fn new(database: impl Into<String>, version: u32) -> Self {
        Self {
            database: database.into(),
            version,
        }
    }

    /// `<database>_<version>.schema.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.schema.json", self.database, self.version)
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Fresh database
    Create,
    Upgrade,
    Downgrade,
    /// Stored version already matches
    Unchanged,
}

/// Result of reconciling a database with the current schema
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    pub from_version: u32,
    pub to_version: u32,
    pub direction: MigrationDirection,
    /// Statements executed, in order
    pub statements: Vec<String>,
}
