// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::StorageKind;

/// Run settings as read from `config.toml`.
///
/// ```toml
/// project_name = "python_project"
/// version = "0.0.0"
/// task_tracker_url = "http://172.17.0.1:8089/gman/task"
/// compute_endpoint = "http://172.17.0.1:8000"
///
/// [storage]
/// type = "http"
/// hostname = "172.17.0.1:9000"
/// access_key = "minio"
/// secret_key = "minio123"
/// ```
///
/// This is the unvalidated form; convert it with `Settings::try_from`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    pub project_name: String,
    pub version: String,
    pub task_tracker_url: String,

    /// Artifact registry base URL. Falls back to `task_tracker_url` when
    /// omitted.
    #[serde(default)]
    pub artifact_registry_url: Option<String>,

    /// Base URL that stage resource URIs are appended to.
    pub compute_endpoint: String,

    pub storage: StorageSection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub snapshot: SnapshotSection,

    /// Root of the project tree that gets archived. Relative paths are
    /// resolved against the current working directory.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

/// Validated run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub version: String,
    pub task_tracker_url: String,
    pub artifact_registry_url: String,
    pub compute_endpoint: String,
    pub storage: StorageSection,
    pub polling: PollingSection,
    pub snapshot: SnapshotSection,
    pub project_root: PathBuf,
}

impl Settings {
    /// Construct without validation. Used by `TryFrom<RawSettings>` after the
    /// checks have passed, and by test builders.
    pub fn new_unchecked(raw: RawSettings) -> Self {
        let artifact_registry_url = raw
            .artifact_registry_url
            .unwrap_or_else(|| raw.task_tracker_url.clone());

        Self {
            project_name: raw.project_name,
            version: raw.version,
            task_tracker_url: raw.task_tracker_url,
            artifact_registry_url,
            compute_endpoint: raw.compute_endpoint,
            storage: raw.storage,
            polling: raw.polling,
            snapshot: raw.snapshot,
            project_root: raw.project_root.unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(rename = "type", default)]
    pub kind: StorageKind,

    /// `host:port` for HTTP stores, a directory for local stores.
    pub hostname: String,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Use `https` instead of `http` when talking to the store.
    #[serde(default)]
    pub secure: bool,
}

/// `[polling]` section: how long to wait on remote threads.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingSection {
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_retry_max() -> u32 {
    20
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            retry_max: default_retry_max(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollingSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// `[snapshot]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSection {
    /// Glob patterns (relative to the project root) left out of the project
    /// archive. The state directory is always excluded.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `stages.toml` as read from disk.
///
/// ```toml
/// [[stages]]
/// name = "style"
/// deps = ["validate"]
/// resources = [{ name = "flake8", uri = "/flake8_v1.1" }]
///
/// [[stages.config]]
/// resource = "flake8"
/// files = "*.py"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStagesFile {
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// Declarative definition of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDefinition {
    pub name: String,

    /// Names of stages that must complete before this one is submitted.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Named remote endpoints this stage can submit to.
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,

    /// Per-invocation directives, each targeting one resource.
    #[serde(default)]
    pub config: Vec<ConfigDirective>,
}

impl StageDefinition {
    /// Look up the URI of a resource by name.
    pub fn resource_uri(&self, resource: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.name == resource)
            .map(|r| r.uri.as_str())
    }

    /// Group `config` directives by the resource they target.
    ///
    /// Groups are returned in order of the first directive that mentions each
    /// resource, so submission order follows the file.
    pub fn directives_by_resource(&self) -> Vec<(&str, Vec<&ConfigDirective>)> {
        let mut groups: Vec<(&str, Vec<&ConfigDirective>)> = Vec::new();
        for directive in &self.config {
            match groups
                .iter_mut()
                .find(|(name, _)| *name == directive.resource)
            {
                Some((_, entries)) => entries.push(directive),
                None => groups.push((directive.resource.as_str(), vec![directive])),
            }
        }
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDefinition {
    pub name: String,
    pub uri: String,
}

/// One directive for a resource. Everything except `resource` is opaque and
/// forwarded to the remote endpoint untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDirective {
    pub resource: String,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Fully loaded and validated pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the config files were read from; also hosts `state/`.
    pub config_dir: PathBuf,
    pub settings: Settings,
    pub stages: Vec<StageDefinition>,
}

impl PipelineConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.config_dir.join("state")
    }
}
