// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User configuration, stored as `config.json` in the drivesoft home.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that relocates the drivesoft home directory.
pub const HOME_ENV: &str = "DRIVESOFT_HOME";

/// Config file name inside the home directory.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where catalog.json and installed.json live (defaults to the home dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Where completed sessions drop their placeholder files
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Write a placeholder file when a session completes (default: true)
    #[serde(default = "default_save_placeholders")]
    pub save_placeholders: bool,
    /// Author recorded on packages published from this machine
    #[serde(default = "default_publisher")]
    pub publisher: String,
    /// tracing level when neither -v nor -q is given (default: "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_save_placeholders() -> bool {
    true
}

fn default_publisher() -> String {
    "DriveSoft".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            download_dir: None,
            save_placeholders: default_save_placeholders(),
            publisher: default_publisher(),
            log_level: default_log_level(),
        }
    }
}

/// `$DRIVESOFT_HOME`, or `~/.drivesoft`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".drivesoft"))
}

impl Config {
    /// Load from the home directory; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&home_dir()?)
    }

    pub fn load_from(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&home_dir()?)
    }

    pub fn save_to(&self, home: &Path) -> Result<PathBuf> {
        fs::create_dir_all(home).with_context(|| format!("Failed to create {:?}", home))?;
        let path = home.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }

    /// Directory holding the JSON stores.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => home_dir(),
        }
    }

    /// Folder for placeholder files: configured, else the user's download
    /// folder, else `<data dir>/downloads`.
    pub fn download_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        match dirs::download_dir() {
            Some(dir) => Ok(dir),
            None => Ok(self.data_dir()?.join("downloads")),
        }
    }
}
