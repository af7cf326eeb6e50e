// src/artifact/mod.rs

//! Project snapshots and content-addressed upload.
//!
//! A stage ships the project to the remote side as a zip archive. Before
//! uploading, the archive's SHA-256 is looked up in the artifact registry;
//! an archive the registry already knows is reused by URI instead of being
//! uploaded again.

use std::path::Path;

use tracing::info;

use crate::errors::{Result, StagehandError};
use crate::remote::{ArtifactRegistry, NewArtifact, ObjectStore, CALLER};
use crate::state::ArtifactRecord;
use crate::types::DedupState;

pub mod hash;
pub mod snapshot;

pub use hash::{content_id, urlsafe_token, ContentHash};
pub use snapshot::{snapshot, SnapshotSpec};

/// An archive ready to be referenced by a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedArtifact {
    /// Archive file name, the key under which the job and state record it.
    pub name: String,
    pub record: ArtifactRecord,
}

pub struct ArtifactDeduplicator<'a> {
    registry: &'a dyn ArtifactRegistry,
    store: &'a dyn ObjectStore,
}

impl<'a> ArtifactDeduplicator<'a> {
    pub fn new(registry: &'a dyn ArtifactRegistry, store: &'a dyn ObjectStore) -> Self {
        Self { registry, store }
    }

    /// Snapshot the project, then make sure the archive is available
    /// remotely, uploading only if its content hash is unknown.
    pub async fn prepare(
        &self,
        spec: &SnapshotSpec,
        run_id: &str,
        task_id: &str,
    ) -> Result<PreparedArtifact> {
        let scratch = tempfile::tempdir()?;
        let archive = snapshot(spec, scratch.path()).map_err(|e| match e {
            StagehandError::ConfigError(_) | StagehandError::Artifact(_) => e,
            other => StagehandError::Artifact(format!("creating project archive: {other}")),
        })?;
        let hash = content_id(&archive)?;

        self.ensure_uploaded(&hash, &archive, run_id, task_id).await
    }

    /// Reuse a registered artifact with the same hash, or upload `archive`
    /// to `artifacts/<name>` in the run's bucket and register it.
    pub async fn ensure_uploaded(
        &self,
        hash: &ContentHash,
        archive: &Path,
        run_id: &str,
        task_id: &str,
    ) -> Result<PreparedArtifact> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StagehandError::Artifact(format!("{archive:?} has no file name")))?;

        if self.registry.exists(&hash.urlsafe).await? {
            let known = self.registry.get(&hash.urlsafe).await?;
            let first = known.into_iter().next().ok_or_else(|| {
                StagehandError::Artifact(format!(
                    "registry reports {} as known but returned no artifacts",
                    hash.sri
                ))
            })?;
            info!(artifact = %name, uri = %first.uri, "artifact already registered; skipping upload");
            return Ok(PreparedArtifact {
                name,
                record: ArtifactRecord {
                    artifact_uri: first.uri,
                    state: DedupState::Found,
                },
            });
        }

        let object = format!("artifacts/{name}");
        self.store.upload(run_id, &object, archive).await?;
        let uri = self.store.uri(run_id, &object);

        self.registry
            .register(&NewArtifact {
                task_id: task_id.to_string(),
                uri: uri.clone(),
                sri: hash.sri.clone(),
                caller: CALLER.to_string(),
            })
            .await?;
        info!(artifact = %name, uri = %uri, "uploaded and registered artifact");

        Ok(PreparedArtifact {
            name,
            record: ArtifactRecord {
                artifact_uri: uri,
                state: DedupState::Uploaded,
            },
        })
    }
}
