use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{CONFIG_GDF, CONFIG_JSON};
use crate::commons::errors::CoastsegError;
use crate::geometric::frame::GeoFrame;

/// The two halves of a saved config
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOutput {
    /// Written to `config.json`
    Json(Value),
    /// Written to `config_gdf.geojson`
    Frame(GeoFrame),
}

/// Write a config half into `dir`, creating it if needed. Returns the file written.
pub fn config_to_file(config: &ConfigOutput, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let path = match config {
        ConfigOutput::Json(value) => {
            let path = dir.join(CONFIG_JSON);
            write_json_file(&path, value)?;
            path
        }
        ConfigOutput::Frame(frame) => {
            let path = dir.join(CONFIG_GDF);
            frame.to_file(&path)?;
            path
        }
    };
    log::info!("Saved config to {}", path.display());
    Ok(path)
}

pub fn read_json_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Err(CoastsegError::FileNotFound(path.to_path_buf()).into());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pretty-printed JSON; parent directories are created
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Saved {}", path.display());
    Ok(())
}

/// Recursive copy of a directory tree
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Move a directory to `dst`, merging into `dst` when it already exists.
/// `src` no longer exists afterwards.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(CoastsegError::DirectoryNotFound(src.to_path_buf()).into());
    }
    if !dst.exists() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        // rename fails across filesystems, fall back to copy + delete
        if fs::rename(src, dst).is_ok() {
            return Ok(());
        }
    }
    copy_dir_all(src, dst)?;
    fs::remove_dir_all(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    Ok(())
}

/// Every file under `dir`, recursively
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries =
            fs::read_dir(&current).with_context(|| format!("Failed to read {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
