// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every variant here is fatal for the run. Corrupted state on resume is the
//! one recoverable condition and never surfaces as an error: the state store
//! logs a warning and starts a clean run instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagehandError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Stage not found: {0}")]
    UnknownStage(String),

    #[error("Cycle detected in stage graph: stage '{stage}' depends on '{dependency}', which is already on the dependency path")]
    DagCycle { stage: String, dependency: String },

    #[error("Resource '{resource}' is not defined in the resources of stage '{stage}'")]
    ResourceResolution { stage: String, resource: String },

    #[error("Stage '{stage}' dependencies {deps:?} are not complete. Check your state file")]
    DependenciesNotComplete { stage: String, deps: Vec<String> },

    #[error("Failed to call {url} gateway for stage '{stage}': {message}")]
    RemoteSubmission {
        stage: String,
        url: String,
        message: String,
    },

    #[error("Remote job for stage '{stage}' did not complete successfully.\n\n{events}")]
    RemoteTaskFailure { stage: String, events: String },

    #[error("Timeout detected waiting for thread_id {thread_id} to complete after {attempts} attempts")]
    RemoteTaskTimeout { thread_id: String, attempts: u32 },

    #[error("Stage '{0}' has no recorded remote thread in this run")]
    NotSubmitted(String),

    #[error("Task tracker error: {0}")]
    TaskTracker(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StagehandError>;
