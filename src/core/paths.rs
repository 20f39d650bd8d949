// src/core/paths.rs

use crate::constants::{APP_DIR_NAME, PROJECT_CACHE_DIRNAME, SETTINGS_FILENAME};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref KEEL_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not find system cache directory.")]
    CacheDirNotFound,
    #[error("Could not create directory at '{path}': {source}")]
    DirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to expand path template '{template}': {message}")]
    Expansion { template: String, message: String },
}

/// Returns the path to the keel configuration directory (`~/.config/keel`).
/// Creates it if it doesn't exist.
///
/// The first call computes and caches the path; later calls return the cached value.
pub fn get_keel_config_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = KEEL_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(APP_DIR_NAME);
    ensure_dir(&config_path)?;

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to the user settings file.
pub fn get_settings_path() -> Result<PathBuf, PathError> {
    get_keel_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// The platform cache root for keel (`~/.cache/keel` on Linux).
pub fn default_cache_root() -> Result<PathBuf, PathError> {
    dirs::cache_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(PathError::CacheDirNotFound)
}

/// Resolves the directory holding compiled projects, honoring a user template
/// such as `~/.keel-cache` or `$XDG_CACHE_HOME/keel`.
pub fn get_project_cache_dir(template: Option<&str>) -> Result<PathBuf, PathError> {
    let root = match template {
        Some(template) => expand_path_template(template)?,
        None => default_cache_root()?,
    };
    Ok(root.join(PROJECT_CACHE_DIRNAME))
}

/// Expands the home directory (`~`) and environment variables (`$VAR`) in a path.
pub fn expand_path_template(template: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::DirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Removes `.` components and resolves `..` against preceding components
/// without touching the filesystem, then strips Windows verbatim prefixes.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    dunce::simplified(&normalized).to_path_buf()
}

/// Resolves `path` against `base` when it is relative, then normalizes it.
pub fn absolutize(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}
