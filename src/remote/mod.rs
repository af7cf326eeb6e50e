// src/remote/mod.rs

//! Clients for the services a pipeline run talks to.
//!
//! Each service sits behind a trait so the engine can run against the real
//! HTTP clients in production and against in-memory fakes in tests:
//!
//! - [`TaskTracker`]: issues task ids, records status, lists thread events.
//! - [`ArtifactRegistry`]: maps content hashes to stored artifact URIs.
//! - [`ObjectStore`]: holds uploaded archives and the logs remote jobs write.
//! - [`ComputeGateway`]: accepts stage jobs on resource endpoints.
//!
//! [`poll`] implements the bounded wait on a remote thread.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::model::{ConfigDirective, Settings};
use crate::errors::Result;
use crate::state::ArtifactRecord;
use crate::types::StorageKind;

pub mod gateway;
pub mod object_store;
pub mod poll;
pub mod registry;
pub mod tracker;

pub use gateway::HttpComputeGateway;
pub use object_store::{HttpObjectStore, LocalObjectStore};
pub use poll::{poll_thread, thread_status, ThreadOutcome, ThreadStatus};
pub use registry::HttpArtifactRegistry;
pub use tracker::HttpTaskTracker;

/// Identifies this client in task tracker and registry records.
pub const CALLER: &str = "stagehand";

/// Boxed future returned by the service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status values understood by the task tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Started,
    Info,
    Completed,
    Failed,
}

/// Body of a request for a new task id.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub run_id: String,
    pub caller: String,
    pub project: String,
    pub status: TaskStatus,
    pub message: String,
}

/// One entry of a thread's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task: Option<EventTask>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Task metadata attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTask {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

/// Registration of a newly uploaded artifact.
#[derive(Debug, Clone, Serialize)]
pub struct NewArtifact {
    pub task_id: String,
    pub uri: String,
    pub sri: String,
    pub caller: String,
}

/// An artifact the registry already knows about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisteredArtifact {
    pub uri: String,
    #[serde(default)]
    pub sri: Option<String>,
}

/// Reference to an object in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_name: String,
}

/// Job submitted to a resource endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub run_id: String,
    pub project: String,
    pub artifacts: BTreeMap<String, ArtifactRecord>,
    pub task_id: String,
    pub configs: Vec<ConfigDirective>,
    pub stage: String,
}

/// What a resource endpoint hands back when it accepts a job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobAccepted {
    pub thread_id: String,
}

/// Responses from the tracker and gateways wrap their payload in `task`.
#[derive(Debug, Deserialize)]
pub(crate) struct TaskEnvelope<T> {
    pub task: T,
}

pub trait TaskTracker: Send + Sync {
    /// Ask for a new task id for client-side work in `request.run_id`.
    fn request_task(&self, request: &NewTask) -> BoxFuture<'_, Result<String>>;

    /// Record a status change on an existing task.
    fn update_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
    ) -> BoxFuture<'_, Result<()>>;

    /// All events recorded for a thread, oldest first.
    fn thread_events(&self, thread_id: &str) -> BoxFuture<'_, Result<Vec<TaskEvent>>>;
}

pub trait ArtifactRegistry: Send + Sync {
    /// Whether an artifact with this URL-safe content hash is registered.
    fn exists(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<bool>>;

    /// Registered artifacts for a URL-safe content hash.
    fn get(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<Vec<RegisteredArtifact>>>;

    fn register(&self, artifact: &NewArtifact) -> BoxFuture<'_, Result<()>>;
}

pub trait ObjectStore: Send + Sync {
    fn upload(&self, bucket: &str, object: &str, local: &Path) -> BoxFuture<'_, Result<()>>;

    /// Objects in `bucket` whose names start with `prefix`. Without
    /// `recursive`, only direct children of the prefix are returned.
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> BoxFuture<'_, Result<Vec<ObjectRef>>>;

    fn download(
        &self,
        bucket: &str,
        object: &ObjectRef,
        local: &Path,
    ) -> BoxFuture<'_, Result<()>>;

    /// Public URI recorded for an object.
    fn uri(&self, bucket: &str, object: &str) -> String;
}

pub trait ComputeGateway: Send + Sync {
    /// POST a job to a resource endpoint. Transport failures and non-2xx
    /// responses are errors.
    fn submit(&self, url: &str, request: &JobRequest) -> BoxFuture<'_, Result<JobAccepted>>;
}

/// The set of service clients a run uses.
#[derive(Clone)]
pub struct Services {
    pub tracker: Arc<dyn TaskTracker>,
    pub registry: Arc<dyn ArtifactRegistry>,
    pub store: Arc<dyn ObjectStore>,
    pub gateway: Arc<dyn ComputeGateway>,
}

impl Services {
    /// Build the production HTTP clients from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store: Arc<dyn ObjectStore> = match settings.storage.kind {
            StorageKind::Http => Arc::new(HttpObjectStore::new(client.clone(), &settings.storage)),
            StorageKind::Local => Arc::new(LocalObjectStore::new(&settings.storage.hostname)),
        };

        Ok(Self {
            tracker: Arc::new(HttpTaskTracker::new(
                client.clone(),
                &settings.task_tracker_url,
            )),
            registry: Arc::new(HttpArtifactRegistry::new(
                client.clone(),
                &settings.artifact_registry_url,
            )),
            store,
            gateway: Arc::new(HttpComputeGateway::new(client)),
        })
    }
}

/// Join a base URL and a path segment with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
