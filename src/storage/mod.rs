//! Persistence layer.
//!
//! The snapshot slot: one remembered payload per agent, read at the start
//! of a tick and overwritten at the end. Two implementations: an
//! in-memory slot and a JSON file on disk. The event log lives in
//! [`events`].

pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::types::{AgentError, Payload};

/// Default snapshot file path.
pub const DEFAULT_SNAPSHOT_FILE: &str = "xeggex_snapshot.json";

/// The host-provided memory slot holding the last-seen payload.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotRepository: Send + Sync {
    /// The previous payload, or `None` before the first successful tick.
    fn read(&self) -> Result<Option<Payload>, AgentError>;

    /// Replace the stored payload.
    fn write(&self, payload: &Payload) -> Result<(), AgentError>;
}

// ---------------------------------------------------------------------------
// In-memory slot
// ---------------------------------------------------------------------------

/// Snapshot held in process memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<Payload>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a payload already remembered.
    pub fn with_payload(payload: Payload) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(payload))),
        }
    }

    /// Current slot contents, for inspection.
    pub fn current(&self) -> Option<Payload> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl SnapshotRepository for MemorySnapshotStore {
    fn read(&self) -> Result<Option<Payload>, AgentError> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| AgentError::Storage(format!("snapshot lock poisoned: {e}")))?;
        Ok(slot.clone())
    }

    fn write(&self, payload: &Payload) -> Result<(), AgentError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| AgentError::Storage(format!("snapshot lock poisoned: {e}")))?;
        *slot = Some(payload.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file slot
// ---------------------------------------------------------------------------

/// On-disk layout of the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    agent: String,
    updated_at: DateTime<Utc>,
    last_status: Payload,
}

/// Snapshot persisted as a JSON file, so it survives restarts.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    agent: String,
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(agent: &str, path: Option<&str>) -> Self {
        Self {
            agent: agent.to_string(),
            path: PathBuf::from(path.unwrap_or(DEFAULT_SNAPSHOT_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging file the next snapshot is written to before the rename.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Delete the snapshot file (for testing or reset).
    pub fn clear(&self) -> Result<(), AgentError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                AgentError::Storage(format!(
                    "failed to delete snapshot {}: {e}",
                    self.path.display()
                ))
            })?;
        }
        Ok(())
    }
}

impl SnapshotRepository for JsonFileSnapshotStore {
    fn read(&self) -> Result<Option<Payload>, AgentError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved snapshot found, starting fresh");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            AgentError::Storage(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let file: SnapshotFile = serde_json::from_str(&json).map_err(|e| {
            AgentError::Storage(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        debug!(
            path = %self.path.display(),
            records = file.last_status.len(),
            updated_at = %file.updated_at,
            "Snapshot loaded"
        );
        Ok(Some(file.last_status))
    }

    fn write(&self, payload: &Payload) -> Result<(), AgentError> {
        let file = SnapshotFile {
            agent: self.agent.clone(),
            updated_at: Utc::now(),
            last_status: payload.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AgentError::Storage(format!("failed to serialise snapshot: {e}")))?;

        // Stage beside the target and rename over it: the live file is only
        // ever replaced whole.
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| {
            AgentError::Storage(format!("failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            AgentError::Storage(format!(
                "failed to replace {} with {}: {e}",
                self.path.display(),
                tmp.display()
            ))
        })?;

        debug!(path = %self.path.display(), records = payload.len(), "Snapshot saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
