// src/state/mod.rs

//! Persisted per-run state.
//!
//! - [`merge`] implements the deep-merge used for every state mutation.
//! - [`store`] loads, updates and persists the state document.
//!
//! The document lives at `<config_dir>/state/state.json` and is rewritten
//! wholesale after every mutation. There is no file locking: two processes
//! sharing one state directory will overwrite each other's updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DedupState, StageStatus};

pub mod merge;
pub mod store;

pub use merge::deep_merge;
pub use store::{StateStore, STATE_FILE};

/// Whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(default)]
    pub stages: BTreeMap<String, StageRecord>,
}

/// What the client knows about one stage in the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StageStatus>,

    /// Task id issued by the task tracker for this stage's client work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_task_id: Option<String>,

    /// Thread id returned by the last resource that accepted a job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Every thread accepted for this stage, in submission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thread_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactRecord>,
}

impl StageRecord {
    /// Threads that must all complete before the stage counts as done.
    ///
    /// Documents written before `thread_ids` existed only carry `thread_id`.
    pub fn threads(&self) -> Vec<String> {
        if self.thread_ids.is_empty() {
            self.thread_id.iter().cloned().collect()
        } else {
            self.thread_ids.clone()
        }
    }
}

/// Provenance of one artifact attached to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_uri: String,
    pub state: DedupState,
}
