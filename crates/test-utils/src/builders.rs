#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use stagehand::config::model::{
    ConfigDirective, PipelineConfig, PollingSection, RawSettings, ResourceDefinition, Settings,
    SnapshotSection, StageDefinition, StorageSection,
};
use stagehand::context::RunContext;
use stagehand::fs::RealFileSystem;
use stagehand::types::StorageKind;
use tempfile::TempDir;

/// Builder for `StageDefinition`.
pub struct StageBuilder {
    stage: StageDefinition,
}

impl StageBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            stage: StageDefinition {
                name: name.to_string(),
                deps: vec![],
                resources: vec![],
                config: vec![],
            },
        }
    }

    pub fn dep(mut self, dep: &str) -> Self {
        self.stage.deps.push(dep.to_string());
        self
    }

    pub fn resource(mut self, name: &str, uri: &str) -> Self {
        self.stage.resources.push(ResourceDefinition {
            name: name.to_string(),
            uri: uri.to_string(),
        });
        self
    }

    /// Add a directive for `resource` with string parameters.
    pub fn directive(mut self, resource: &str, params: &[(&str, &str)]) -> Self {
        let params: Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.stage.config.push(ConfigDirective {
            resource: resource.to_string(),
            params,
        });
        self
    }

    /// Shorthand for a stage with one resource and one directive for it.
    pub fn runs_on(self, resource: &str) -> Self {
        self.resource(resource, &format!("/{resource}"))
            .directive(resource, &[])
    }

    pub fn build(self) -> StageDefinition {
        self.stage
    }
}

/// Builder for validated `Settings`.
pub struct SettingsBuilder {
    raw: RawSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawSettings {
                project_name: "python_project".to_string(),
                version: "0.0.0".to_string(),
                task_tracker_url: "http://tracker.test/task".to_string(),
                artifact_registry_url: None,
                compute_endpoint: "http://faas.test".to_string(),
                storage: StorageSection {
                    kind: StorageKind::Http,
                    hostname: "storage.test:9000".to_string(),
                    access_key: None,
                    secret_key: None,
                    secure: false,
                },
                // Keep polling fast; tests never want to wait a second.
                polling: PollingSection {
                    retry_max: 3,
                    interval_ms: 1,
                },
                snapshot: SnapshotSection::default(),
                project_root: None,
            },
        }
    }

    pub fn project_name(mut self, name: &str) -> Self {
        self.raw.project_name = name.to_string();
        self
    }

    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.raw.project_root = Some(root.into());
        self
    }

    pub fn polling(mut self, retry_max: u32, interval_ms: u64) -> Self {
        self.raw.polling = PollingSection {
            retry_max,
            interval_ms,
        };
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.raw.snapshot.exclude.push(pattern.to_string());
        self
    }

    pub fn build(self) -> Settings {
        Settings::try_from(self.raw).expect("Failed to build valid settings from builder")
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A throwaway project tree on disk with a config directory inside it.
///
/// ```text
/// <tmp>/
///   setup.py
///   src/app.py
///   stagehand.d/default/      (config_dir; state/ is created on demand)
/// ```
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project");
        let root = dir.path();
        fs::create_dir_all(root.join("src")).expect("create src");
        fs::create_dir_all(root.join("stagehand.d/default")).expect("create config dir");
        fs::write(root.join("setup.py"), "from setuptools import setup\nsetup()\n")
            .expect("write setup.py");
        fs::write(root.join("src/app.py"), "print('hello')\n").expect("write app.py");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("stagehand.d/default")
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir().join("state").join(stagehand::state::STATE_FILE)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write project file");
    }

    /// Default settings rooted at this project.
    pub fn settings(&self) -> Settings {
        SettingsBuilder::new().project_root(self.root()).build()
    }

    pub fn pipeline(&self, settings: Settings, stages: Vec<StageDefinition>) -> PipelineConfig {
        PipelineConfig {
            config_dir: self.config_dir(),
            settings,
            stages,
        }
    }

    /// Open a run context on the real filesystem.
    pub fn context(&self, stages: Vec<StageDefinition>, clean: bool) -> RunContext {
        let config = self.pipeline(self.settings(), stages);
        RunContext::new(config, Arc::new(RealFileSystem), clean, false)
            .expect("Failed to open run context")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
