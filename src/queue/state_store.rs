// src/queue/state_store.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::fs::FileSystem;

/// File name of the per-project snapshot inside the state directory.
pub const SNAPSHOT_FILE: &str = "queue_state.json";

/// Durable view of one project's queue.
///
/// `current_id` is never contained in `pending_ids`, and `pending_ids` has
/// no duplicates. `queue_size` mirrors `pending_ids.len()` for humans
/// reading the file directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub project: String,
    #[serde(default)]
    pub pending_ids: Vec<String>,
    #[serde(default)]
    pub current_id: Option<String>,
    #[serde(default)]
    pub queue_size: usize,
    pub updated_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn new(
        project: impl Into<String>,
        pending_ids: Vec<String>,
        current_id: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project: project.into(),
            queue_size: pending_ids.len(),
            pending_ids,
            current_id,
            updated_at,
        }
    }

    pub fn empty(project: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self::new(project, Vec::new(), None, updated_at)
    }

    /// Move an interrupted `current_id` back to the front of the pending
    /// list. Returns the requeued id, if any.
    ///
    /// Duplicates left behind by a hand-edited or foreign file are dropped
    /// so the recovered snapshot is consistent again.
    pub fn recover_interrupted(&mut self) -> Option<String> {
        let interrupted = self.current_id.take();

        let mut ids = Vec::with_capacity(self.pending_ids.len() + 1);
        ids.extend(interrupted.iter().cloned());
        ids.append(&mut self.pending_ids);

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));

        self.queue_size = ids.len();
        self.pending_ids = ids;
        interrupted
    }

    /// 1-based position of `id` among the waiting tasks.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.pending_ids.iter().position(|p| p == id).map(|i| i + 1)
    }

    /// No duplicate pending ids and the current id is not also pending.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        let unique = self.pending_ids.iter().all(|id| seen.insert(id.as_str()));
        let current_ok = self
            .current_id
            .as_deref()
            .is_none_or(|c| !seen.contains(c));
        unique && current_ok && self.queue_size == self.pending_ids.len()
    }
}

/// Reads and atomically replaces `<state-dir>/queue_state.json`.
#[derive(Debug, Clone)]
pub struct QueueStateStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl QueueStateStore {
    pub fn new(state_dir: &Path, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: state_dir.join(SNAPSHOT_FILE),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot was ever written.
    pub fn load(&self) -> Result<Option<QueueSnapshot>> {
        if !self.fs.exists(&self.path) {
            return Ok(None);
        }
        let contents = self.fs.read_to_string(&self.path)?;
        let snapshot: QueueSnapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &QueueSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        self.fs.write_atomic(&self.path, &json)
    }
}
