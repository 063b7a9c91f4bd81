use crate::error::{HarvestError, Result};
use crate::extract::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Progress captured so far, as kept between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub records: Vec<Record>,
    pub error_count: usize,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &RunSnapshot) -> Result<()>;

    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<RunSnapshot>>;

    fn clear(&self) -> Result<()>;
}

/// Snapshot kept as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot_error(&self, action: &str, error: impl std::fmt::Display) -> HarvestError {
        HarvestError::Snapshot {
            message: format!("Failed to {} {}: {}", action, self.path.display(), error),
        }
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory).map_err(|e| self.snapshot_error("create directory for", e))?;

        let mut stamped = snapshot.clone();
        stamped.updated_at = Some(Utc::now());
        let content = serde_json::to_vec_pretty(&stamped)?;

        let mut temp = NamedTempFile::new_in(&directory).map_err(|e| self.snapshot_error("stage", e))?;
        temp.write_all(&content)
            .and_then(|_| temp.flush())
            .map_err(|e| self.snapshot_error("write", e))?;
        temp.persist(&self.path)
            .map_err(|e| self.snapshot_error("replace", e.error))?;

        Ok(())
    }

    fn load(&self) -> Result<Option<RunSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.snapshot_error("read", e))?;
        let snapshot = serde_json::from_str(&content).map_err(|e| self.snapshot_error("parse", e))?;
        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.snapshot_error("remove", e)),
        }
    }
}

/// Keeps the latest snapshot in memory; for rehearsals that must not touch disk.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<Option<RunSnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(snapshot.clone());
        }
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<RunSnapshot>> {
        Ok(self.latest.lock().ok().and_then(|latest| latest.clone()))
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot() -> RunSnapshot {
        let mut record = Record::new();
        record.set("série/ano", "7A");
        record.set("numero_linha", "1");
        RunSnapshot {
            records: vec![record],
            error_count: 2,
            running: true,
            updated_at: None,
        }
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("progress.json"));
        assert!(store.load().unwrap().is_none());

        store.save(&snapshot()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.records, snapshot().records);
        assert_eq!(loaded.error_count, 2);
        assert!(loaded.updated_at.is_some());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"errorCount\": 2"));
        assert!(raw.contains("\"running\": true"));
    }

    #[test]
    fn test_json_store_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("progress.json"));
        store.save(&snapshot()).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonSnapshotStore::new(path);
        assert!(matches!(store.load(), Err(HarvestError::Snapshot { .. })));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemorySnapshotStore::new();
        store.save(&snapshot()).unwrap();
        store.save(&snapshot()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert!(store.load().unwrap().is_some());
    }
}
