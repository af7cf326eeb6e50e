// src/context.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::artifact::SnapshotSpec;
use crate::config::model::{PipelineConfig, Settings};
use crate::dag::StageGraph;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::state::StateStore;

/// Everything a run needs that is settled before the first stage executes:
/// validated settings, the stage graph and the opened state store.
#[derive(Debug)]
pub struct RunContext {
    pub settings: Settings,
    pub graph: StageGraph,
    pub state: StateStore,
    pub config_dir: PathBuf,
    /// Echo job payloads and artifact records at info level.
    pub debug: bool,
}

impl RunContext {
    /// Build the stage graph and open the state store.
    ///
    /// With `clean`, any persisted state is discarded and a fresh run id is
    /// generated.
    pub fn new(
        config: PipelineConfig,
        fs: Arc<dyn FileSystem>,
        clean: bool,
        debug: bool,
    ) -> Result<Self> {
        let state_dir = config.state_dir();
        let graph = StageGraph::build(config.stages)?;
        let state = StateStore::open(fs, &state_dir, clean)?;
        debug!(
            run_id = %state.run_id(),
            stages = graph.len(),
            state_dir = ?state_dir,
            "run context ready"
        );

        Ok(Self {
            settings: config.settings,
            graph,
            state,
            config_dir: config.config_dir,
            debug,
        })
    }

    pub fn run_id(&self) -> &str {
        self.state.run_id()
    }

    pub fn project_name(&self) -> &str {
        &self.settings.project_name
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config_dir.join("state")
    }

    /// Archive settings for this project.
    pub fn snapshot_spec(&self) -> SnapshotSpec {
        SnapshotSpec {
            project_root: self.settings.project_root.clone(),
            state_dir: self.state_dir(),
            exclude: self.settings.snapshot.exclude.clone(),
            archive_name: format!("{}.zip", self.settings.project_name),
        }
    }
}
