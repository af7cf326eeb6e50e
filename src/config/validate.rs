// src/config/validate.rs

use std::collections::HashSet;

use reqwest::Url;

use crate::config::model::{RawSettings, RawStagesFile, Settings, StageDefinition};
use crate::errors::{Result, StagehandError};
use crate::types::StorageKind;

impl TryFrom<RawSettings> for Settings {
    type Error = StagehandError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        validate_settings(&raw)?;
        Ok(Settings::new_unchecked(raw))
    }
}

/// Validate a raw stages file and return its definitions.
///
/// Resource references inside `config` directives are deliberately not
/// checked here; they are resolved when a stage is executed.
pub fn validate_stages(raw: RawStagesFile) -> Result<Vec<StageDefinition>> {
    ensure_has_stages(&raw)?;
    validate_stage_names(&raw.stages)?;
    validate_stage_dependencies(&raw.stages)?;
    Ok(raw.stages)
}

fn validate_settings(raw: &RawSettings) -> Result<()> {
    if raw.project_name.trim().is_empty() {
        return Err(StagehandError::ConfigError(
            "project_name must not be empty".to_string(),
        ));
    }
    if raw.version.trim().is_empty() {
        return Err(StagehandError::ConfigError(
            "version must not be empty".to_string(),
        ));
    }

    ensure_url("task_tracker_url", &raw.task_tracker_url)?;
    ensure_url("compute_endpoint", &raw.compute_endpoint)?;
    if let Some(ref url) = raw.artifact_registry_url {
        ensure_url("artifact_registry_url", url)?;
    }

    if raw.storage.hostname.trim().is_empty() {
        return Err(StagehandError::ConfigError(
            "[storage].hostname must not be empty".to_string(),
        ));
    }
    if raw.storage.kind == StorageKind::Http
        && raw.storage.access_key.is_some() != raw.storage.secret_key.is_some()
    {
        return Err(StagehandError::ConfigError(
            "[storage].access_key and [storage].secret_key must be set together".to_string(),
        ));
    }

    if raw.polling.retry_max == 0 {
        return Err(StagehandError::ConfigError(
            "[polling].retry_max must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn ensure_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value).map_err(|e| {
        StagehandError::ConfigError(format!("{field} is not a valid URL ('{value}'): {e}"))
    })?;
    Ok(())
}

fn ensure_has_stages(raw: &RawStagesFile) -> Result<()> {
    if raw.stages.is_empty() {
        return Err(StagehandError::ConfigError(
            "stages file must contain at least one [[stages]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_stage_names(stages: &[StageDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for stage in stages {
        if stage.name.trim().is_empty() {
            return Err(StagehandError::ConfigError(
                "stage name must not be empty".to_string(),
            ));
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(StagehandError::ConfigError(format!(
                "stage '{}' is defined more than once",
                stage.name
            )));
        }
    }
    Ok(())
}

fn validate_stage_dependencies(stages: &[StageDefinition]) -> Result<()> {
    let names: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();
    for stage in stages {
        for dep in &stage.deps {
            if !names.contains(dep.as_str()) {
                return Err(StagehandError::ConfigError(format!(
                    "stage '{}' has unknown dependency '{}' in `deps`",
                    stage.name, dep
                )));
            }
        }
    }
    Ok(())
}
