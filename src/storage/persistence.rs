//! Snapshot persistence for the in-memory counter store

use super::table::CounterTable;
use crate::core::{Result, SerialError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Storage Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub tables: HashMap<String, CounterTable>,
}

impl StorageSnapshot {
    pub fn new(tables: HashMap<String, CounterTable>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            tables,
        }
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(|t| t.row_count()).sum()
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write the snapshot next to its final path, then atomically move it in.
    pub fn save(&self, snapshot: &StorageSnapshot) -> Result<()> {
        let parent = match self.snapshot_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| SerialError::Io(format!("Failed to create snapshot directory: {}", e)))?;

        let serialized = rmp_serde::to_vec(snapshot)?;
        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| SerialError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| SerialError::Io(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SerialError::Io(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| SerialError::Io(format!("Failed to move snapshot into place: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StorageSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)
            .map_err(|e| SerialError::Io(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StorageSnapshot = rmp_serde::from_slice(&data)?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(SerialError::Storage(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }
}
