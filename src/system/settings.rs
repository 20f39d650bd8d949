// src/system/settings.rs

use crate::core::paths::{self, PathError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("I/O error on settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Could not serialize default settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// User settings from `settings.toml`. Missing keys take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Worker threads; `0` means one per logical CPU.
    pub max_parallelism: usize,
    /// Upper bound on how long an idle worker sleeps before re-checking.
    pub poll_interval_ms: u64,
    /// Global properties visible to every project.
    pub default_properties: BTreeMap<String, String>,
    pub compiler: CompilerSettings,
    pub cache: CacheSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerSettings {
    pub executable: String,
    /// Flags placed before every generated compiler argument.
    pub default_flags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Cache root; supports `~` and `$VAR`. Defaults to the platform cache dir.
    pub directory: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallelism: 0,
            poll_interval_ms: 250,
            default_properties: BTreeMap::from([
                ("Configuration".to_string(), "Debug".to_string()),
                ("Platform".to_string(), "AnyCPU".to_string()),
            ]),
            compiler: CompilerSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        let executable = if cfg!(target_os = "windows") {
            "csc.exe"
        } else {
            "csc"
        };
        Self {
            executable: executable.to_string(),
            default_flags: vec!["/nologo".to_string()],
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

impl Settings {
    /// The number of workers to start.
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallelism > 0 {
            return self.max_parallelism;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cache_dir(&self) -> Result<PathBuf, PathError> {
        paths::get_project_cache_dir(self.cache.directory.as_deref())
    }
}

/// Loads the user settings, writing the defaults on first run.
pub fn load_settings() -> Result<Settings, SettingsError> {
    let path = paths::get_settings_path()?;
    load_settings_from(&path)
}

/// Loads settings from `path`, creating it with the defaults if it is missing.
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    let io_error = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if !path.exists() {
        log::debug!("Writing default settings to '{}'.", path.display());
        let defaults = Settings::default();
        let toml_string = toml::to_string_pretty(&defaults)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, toml_string).map_err(io_error)?;
        return Ok(defaults);
    }
    let content = fs::read_to_string(path).map_err(io_error)?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// True if `executable_name` is found in one of the `PATH` directories.
pub fn is_executable_in_path(executable_name: &str) -> bool {
    if Path::new(executable_name).is_absolute() {
        return Path::new(executable_name).is_file();
    }
    env::var_os("PATH").is_some_and(|path_var| {
        env::split_paths(&path_var).any(|dir| dir.join(executable_name).is_file())
    })
}
