//! Persistent CLI settings
//!
//! A small JSON document naming the project and record kind to operate on.
//! Lives in the OS config directory unless `FQ_CONFIG_HOME` points elsewhere.

use crate::error::{ProfilerError, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "fastq-profiler";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const CONFIG_HOME_ENV: &str = "FQ_CONFIG_HOME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub project: String,
    pub kind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            kind: "fastq".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ProfilerError::Settings(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Update one setting by name (`project` or `kind`).
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "project" => self.project = value.to_string(),
            "kind" => self.kind = value.to_string(),
            other => {
                return Err(ProfilerError::Settings(format!(
                    "unknown setting '{}', expected 'project' or 'kind'",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Application directory holding the settings file and the default store.
pub fn app_dir() -> Result<PathBuf> {
    let base = match std::env::var_os(CONFIG_HOME_ENV) {
        Some(path) => PathBuf::from(path),
        None => BaseDirs::new()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ProfilerError::Settings("no config directory available".into()))?,
    };
    Ok(base.join(APP_DIR_NAME))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(SETTINGS_FILE_NAME))
}

pub fn default_store_root() -> Result<PathBuf> {
    Ok(app_dir()?.join("store"))
}
