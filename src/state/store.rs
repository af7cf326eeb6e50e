// src/state/store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{Result, StagehandError};
use crate::fs::FileSystem;
use crate::state::{deep_merge, RunState, StageRecord};
use crate::types::StageStatus;

/// Name of the state document inside the state directory.
pub const STATE_FILE: &str = "state.json";

/// Write-through store for the run state document.
///
/// Every mutation is persisted before the call returns, so an interrupted
/// run always leaves a consistent snapshot to resume from.
#[derive(Debug)]
pub struct StateStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    state: RunState,
}

impl StateStore {
    /// Open the store in `state_dir` and settle the run id.
    ///
    /// With `clean`, any existing state is discarded. Without it, the
    /// persisted state is resumed; a missing or unparsable run id resets the
    /// store to a clean run instead of failing.
    pub fn open(fs: Arc<dyn FileSystem>, state_dir: impl AsRef<Path>, clean: bool) -> Result<Self> {
        let path = state_dir.as_ref().join(STATE_FILE);
        let mut store = Self {
            fs,
            path,
            state: RunState::default(),
        };

        if !clean {
            store.state = store.load();
        }
        let run_id = store.get_or_create_run_id(clean)?;
        info!(run_id = %run_id, clean, "state store ready");
        Ok(store)
    }

    /// Read the state document from disk.
    ///
    /// Returns an empty state when the file does not exist. A document that
    /// cannot be parsed is treated the same way, with a warning.
    pub fn load(&self) -> RunState {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no state file; starting empty");
            return RunState::default();
        }

        let parsed = self
            .fs
            .read_to_string(&self.path)
            .map_err(StagehandError::from)
            .and_then(|s| serde_json::from_str::<RunState>(&s).map_err(StagehandError::from));

        match parsed {
            Ok(state) => state,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "state file is unreadable; ignoring it");
                RunState::default()
            }
        }
    }

    /// Persist the current state, replacing the document on disk.
    pub fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        self.fs.write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    /// Return the run id for this invocation.
    ///
    /// `clean` always produces a fresh id and an empty stage mapping.
    /// Otherwise the persisted id is reused if it is a valid UUID; if not,
    /// the store falls back to the clean path.
    pub fn get_or_create_run_id(&mut self, clean: bool) -> Result<String> {
        if !clean {
            match self.state.run_id.as_deref().map(Uuid::parse_str) {
                Some(Ok(id)) => return Ok(id.to_string()),
                Some(Err(e)) => warn!(
                    path = ?self.path,
                    error = %e,
                    "persisted run_id is not a valid identifier; starting a clean run"
                ),
                None => warn!(
                    path = ?self.path,
                    "no run_id found in state; starting a clean run"
                ),
            }
        }

        self.clean()?;
        let run_id = Uuid::new_v4().to_string();
        self.state.run_id = Some(run_id.clone());
        self.save()?;
        debug!(run_id = %run_id, "generated new run_id");
        Ok(run_id)
    }

    /// Drop all persisted state.
    pub fn clean(&mut self) -> Result<()> {
        if self.fs.exists(&self.path) {
            self.fs.remove_file(&self.path)?;
        }
        self.state = RunState::default();
        Ok(())
    }

    /// Deep-merge a `{stage: record-fragment}` patch into the stage mapping
    /// and persist the result.
    pub fn update(&mut self, patch: Value) -> Result<()> {
        if !patch.is_object() {
            return Err(StagehandError::Other(anyhow::anyhow!(
                "state patch must be an object keyed by stage name, got {patch}"
            )));
        }

        let mut stages = serde_json::to_value(&self.state.stages)?;
        deep_merge(&mut stages, patch);
        self.state.stages = serde_json::from_value(stages)?;
        self.save()
    }

    /// Shorthand for updating only the `state` field of one stage.
    pub fn set_status(&mut self, stage: &str, status: StageStatus) -> Result<()> {
        debug!(stage = %stage, status = %status, "stage state transition");
        self.update(json!({ stage: { "state": status } }))
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        self.state.run_id.as_deref().unwrap_or_default()
    }

    pub fn record(&self, stage: &str) -> Option<&StageRecord> {
        self.state.stages.get(stage)
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.record(stage).and_then(|r| r.state)
    }

    pub fn is_completed(&self, stage: &str) -> bool {
        self.status(stage) == Some(StageStatus::Completed)
    }
}
