// src/artifact/snapshot.rs

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::errors::{Result, StagehandError};

/// What to archive and what to leave out.
#[derive(Debug, Clone)]
pub struct SnapshotSpec {
    pub project_root: PathBuf,
    /// Always excluded, so the state file never ends up inside the artifact
    /// it describes.
    pub state_dir: PathBuf,
    /// Glob patterns relative to `project_root`.
    pub exclude: Vec<String>,
    /// File name of the archive, e.g. `python_project.zip`.
    pub archive_name: String,
}

/// Zip the project tree into `dest_dir/<archive_name>`.
///
/// The archive is deterministic for an unchanged tree: entries are sorted,
/// and timestamps and permissions are fixed, so identical content always
/// hashes the same.
pub fn snapshot(spec: &SnapshotSpec, dest_dir: &Path) -> Result<PathBuf> {
    let root = spec.project_root.canonicalize().map_err(|e| {
        StagehandError::Artifact(format!(
            "project root {:?} is not accessible: {e}",
            spec.project_root
        ))
    })?;
    let state_dir = absolute(&spec.state_dir)?;
    let excludes = build_globset(&spec.exclude)?;

    let archive_path = dest_dir.join(&spec.archive_name);
    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let path = entry.path();
            if path.starts_with(&state_dir) || path.starts_with(dest_dir) {
                return false;
            }
            match relative_name(&root, path) {
                Some(rel) => !excludes.is_match(&rel),
                None => true,
            }
        });

    let mut files = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| StagehandError::Artifact(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_name(&root, entry.path()) else {
            continue;
        };

        zip.start_file(rel.as_str(), options)?;
        let mut src = File::open(entry.path())?;
        io::copy(&mut src, &mut zip)?;
        files += 1;
    }
    zip.finish()?;

    debug!(archive = ?archive_path, files, "created project archive");
    Ok(archive_path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            StagehandError::ConfigError(format!("invalid snapshot exclude pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| StagehandError::ConfigError(format!("building exclude patterns: {e}")))
}

/// `/`-separated path of `path` relative to `root`; `None` for the root.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
