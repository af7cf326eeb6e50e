// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{PipelineConfig, RawSettings, RawStagesFile, Settings};
use crate::config::validate::validate_stages;
use crate::errors::{Result, StagehandError};

/// File holding run settings inside the config directory.
pub const SETTINGS_FILE: &str = "config.toml";

/// File holding stage definitions inside the config directory.
pub const STAGES_FILE: &str = "stages.toml";

/// Load `config.toml` from the config directory without validation.
pub fn load_settings(config_dir: impl AsRef<Path>) -> Result<RawSettings> {
    let path = config_dir.as_ref().join(SETTINGS_FILE);
    let contents = read_config_file(&path)?;
    let raw: RawSettings = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load `stages.toml` from the config directory without validation.
pub fn load_stages(config_dir: impl AsRef<Path>) -> Result<RawStagesFile> {
    let path = config_dir.as_ref().join(STAGES_FILE);
    let contents = read_config_file(&path)?;
    let raw: RawStagesFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load both config files from a directory and validate them.
///
/// This is the entry point for the rest of the application:
///
/// - Reads `config.toml` and `stages.toml`.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks settings sanity, unique stage names and known `deps`.
///
/// Cycle detection happens later, when an execution order is resolved.
pub fn load_and_validate(config_dir: impl AsRef<Path>) -> Result<PipelineConfig> {
    let config_dir = config_dir.as_ref();
    if !config_dir.is_dir() {
        return Err(StagehandError::ConfigError(format!(
            "config directory {:?} does not exist",
            config_dir
        )));
    }

    let settings = Settings::try_from(load_settings(config_dir)?)?;
    let stages = validate_stages(load_stages(config_dir)?)?;
    debug!(
        project = %settings.project_name,
        stages = stages.len(),
        "loaded pipeline configuration"
    );

    Ok(PipelineConfig {
        config_dir: config_dir.to_path_buf(),
        settings,
        stages,
    })
}

/// Default config directory, relative to the working directory.
pub fn default_config_dir() -> PathBuf {
    PathBuf::from("stagehand.d/default")
}

fn read_config_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        StagehandError::ConfigError(format!("failed to read {:?}: {}", path, e))
    })
}
