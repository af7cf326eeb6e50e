use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a stage within a single run.
///
/// `Completed` is final for a given run id. A `Failed` stage is started again
/// the next time it is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// A task id was issued and the stage is preparing its submission.
    Started,
    /// At least one resource accepted a job for this stage.
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Started => "started",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a project artifact ended up registered for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupState {
    /// The registry already knew this content hash; nothing was uploaded.
    Found,
    /// The archive was uploaded and registered during this run.
    Uploaded,
}

/// Backend used for the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Plain REST object store reached over HTTP(S).
    Http,
    /// Directory tree on the local machine (`hostname` is the root path).
    Local,
}

impl Default for StorageKind {
    fn default() -> Self {
        StorageKind::Http
    }
}
