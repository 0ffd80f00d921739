//! Database configuration
//!
//! Settings for opening a [`Database`](crate::database::Database): where the
//! file lives, which schema version it should be at, and how migrations run.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ModelError, ModelResult};
use crate::migrations::MigrationMode;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Logical database name, used to key schema snapshots
    pub name: String,
    /// Database file; `None` opens an in-memory database
    pub path: Option<PathBuf>,
    /// Schema version the database is migrated to on open
    pub version: u32,
    pub migration_mode: MigrationMode,
    /// Allow opening a database stamped with a newer version
    pub rollback_on_downgrade: bool,
    /// Directory for schema snapshot files; `None` keeps them in memory
    pub snapshot_dir: Option<PathBuf>,
    /// Enable `PRAGMA foreign_keys`
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            path: None,
            version: 1,
            migration_mode: MigrationMode::default(),
            rollback_on_downgrade: false,
            snapshot_dir: None,
            foreign_keys: false,
        }
    }
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_migration_mode(mut self, mode: MigrationMode) -> Self {
        self.migration_mode = mode;
        self
    }

    pub fn with_rollback_on_downgrade(mut self, enabled: bool) -> Self {
        self.rollback_on_downgrade = enabled;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Load from `ORM_*` environment variables, defaulting what is unset
    pub fn from_env() -> ModelResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> ModelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            name: lookup("ORM_DATABASE_NAME").unwrap_or(defaults.name),
            path: lookup("ORM_DATABASE_PATH").map(PathBuf::from).or(defaults.path),
            version: parse_var(&lookup, "ORM_DATABASE_VERSION")?.unwrap_or(defaults.version),
            migration_mode: parse_var(&lookup, "ORM_MIGRATION_MODE")?.unwrap_or(defaults.migration_mode),
            rollback_on_downgrade: parse_flag(&lookup, "ORM_ROLLBACK_ON_DOWNGRADE")?
                .unwrap_or(defaults.rollback_on_downgrade),
            snapshot_dir: lookup("ORM_SNAPSHOT_DIR").map(PathBuf::from).or(defaults.snapshot_dir),
            foreign_keys: parse_flag(&lookup, "ORM_FOREIGN_KEYS")?.unwrap_or(defaults.foreign_keys),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Configuration(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.version == 0 {
            return Err(ModelError::Configuration(
                "Database version must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> ModelResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ModelError::Configuration(format!("Invalid value for {}: '{}'", key, raw)))
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, key: &str) -> ModelResult<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ModelError::Configuration(format!("Invalid value for {}: '{}'", key, raw))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.migration_mode, MigrationMode::Update);
        assert!(config.path.is_none());
        assert!(!config.foreign_keys);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("ORM_DATABASE_NAME", "library"),
            ("ORM_DATABASE_PATH", "/tmp/library.db"),
            ("ORM_DATABASE_VERSION", "3"),
            ("ORM_MIGRATION_MODE", "create"),
            ("ORM_FOREIGN_KEYS", "on"),
        ]))
        .unwrap();
        assert_eq!(config.name, "library");
        assert_eq!(config.path, Some(PathBuf::from("/tmp/library.db")));
        assert_eq!(config.version, 3);
        assert_eq!(config.migration_mode, MigrationMode::Create);
        assert!(config.foreign_keys);
        assert!(!config.rollback_on_downgrade);
    }

    #[test]
    fn test_invalid_values() {
        let bad_version = DatabaseConfig::from_lookup(lookup(&[("ORM_DATABASE_VERSION", "two")]));
        assert!(matches!(bad_version, Err(ModelError::Configuration(_))));

        let zero = DatabaseConfig::from_lookup(lookup(&[("ORM_DATABASE_VERSION", "0")]));
        assert!(matches!(zero, Err(ModelError::Configuration(_))));

        let bad_flag = DatabaseConfig::from_lookup(lookup(&[("ORM_FOREIGN_KEYS", "maybe")]));
        assert!(matches!(bad_flag, Err(ModelError::Configuration(_))));

        assert!(DatabaseConfig::new(" ").validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"name": "app", "version": 2, "migration_mode": "create"}"#).unwrap();
        assert_eq!(config.name, "app");
        assert_eq!(config.version, 2);
        assert_eq!(config.migration_mode, MigrationMode::Create);
        assert!(config.snapshot_dir.is_none());
    }
}
