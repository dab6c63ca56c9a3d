//! Durable snapshots of a partially embedded record collection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Record, RunState};
use crate::utils::{remove_if_exists, write_atomic};

pub const CHECKPOINT_VERSION: u32 = 1;

/// Snapshot of the full record collection plus what it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub model: String,
    /// Fingerprint of the input texts, see [`crate::services::input_fingerprint`].
    pub input_fingerprint: String,
    pub saved_at: DateTime<Utc>,
    pub records: Vec<Record>,
}

impl Checkpoint {
    pub fn new(
        model: impl Into<String>,
        input_fingerprint: impl Into<String>,
        records: Vec<Record>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            model: model.into(),
            input_fingerprint: input_fingerprint.into(),
            saved_at: Utc::now(),
            records,
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_records(&self.records)
    }
}

/// Where checkpoints live. The pipeline is the only writer.
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError>;

    /// Overwrite any previous checkpoint.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Remove the checkpoint; succeeds when there is none.
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file on local disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        debug!(path = %self.path.display(), records = checkpoint.records.len(), "loaded checkpoint");
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.path, &bytes).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "saved checkpoint");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.path).map_err(|e| self.io_error(e))
    }
}

/// In-memory store that also keeps every saved snapshot.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    current: Option<Checkpoint>,
    history: Vec<Checkpoint>,
    clears: usize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing checkpoint, as if left behind by an interrupted run.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        store.lock().current = Some(checkpoint);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Option<Checkpoint> {
        self.lock().current.clone()
    }

    /// Every snapshot saved so far, oldest first.
    pub fn history(&self) -> Vec<Checkpoint> {
        self.lock().history.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().history.len()
    }

    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.lock().current.clone())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.current = Some(checkpoint.clone());
        inner.history.push(checkpoint.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.current = None;
        inner.clears += 1;
        Ok(())
    }
}
