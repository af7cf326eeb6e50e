// src/config/mod.rs

//! Configuration loading and validation for stagehand.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load `config.toml` and `stages.toml` from a directory (`loader.rs`).
//! - Validate basic invariants like unique names and known deps (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_dir, load_and_validate, load_settings, load_stages};
pub use model::{
    ConfigDirective, PipelineConfig, PollingSection, RawSettings, RawStagesFile,
    ResourceDefinition, Settings, SnapshotSection, StageDefinition, StorageSection,
};
pub use validate::validate_stages;
