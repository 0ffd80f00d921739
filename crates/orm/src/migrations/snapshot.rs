//! Schema snapshot stores

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::definitions::SnapshotKey;
use crate::error::{ModelError, ModelResult};
use crate::schema::Schema;

/// Persists schema snapshots keyed by database name and version
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot, replacing any previous one under the same key
    fn save(&self, key: &SnapshotKey, schema: &Schema) -> ModelResult<bool>;

    /// Load a snapshot; `None` when nothing usable is stored
    fn load(&self, key: &SnapshotKey) -> ModelResult<Option<Schema>>;
}

/// Snapshots as JSON files in one directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, key: &SnapshotKey, schema: &Schema) -> ModelResult<bool> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ModelError::Migration(format!(
                "Failed to create snapshot directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(schema)?;
        fs::write(&path, json).map_err(|e| {
            ModelError::Migration(format!("Failed to write snapshot {}: {}", path.display(), e))
        })?;
        debug!("Saved schema snapshot {}", path.display());
        Ok(true)
    }

    fn load(&self, key: &SnapshotKey) -> ModelResult<Option<Schema>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("No schema snapshot at {}", path.display());
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str(&contents) {
            Ok(schema) => Ok(Some(schema)),
            Err(e) => {
                warn!("Ignoring unreadable schema snapshot {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }
}

/// Snapshots held in memory, for in-memory databases and tests
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<SnapshotKey, Schema>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, key: &SnapshotKey, schema: &Schema) -> ModelResult<bool> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| ModelError::Migration("snapshot store lock poisoned".to_string()))?;
        snapshots.insert(key.clone(), schema.clone());
        Ok(true)
    }

    fn load(&self, key: &SnapshotKey) -> ModelResult<Option<Schema>> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| ModelError::Migration("snapshot store lock poisoned".to_string()))?;
        Ok(snapshots.get(key).cloned())
    }
}
