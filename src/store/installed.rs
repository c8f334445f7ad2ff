// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The installed set: ids of catalog items completed on this device.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;

use super::locked_file::LockedJsonFile;
use super::locks::resilient_lock;

/// Persisted, append-only set of installed item ids.
///
/// `mark_installed` is a single transaction: implementations must not let two
/// concurrent calls lose each other's id.
pub trait InstalledStore: Send + Sync {
    /// All installed ids, in the order they were first recorded.
    fn installed(&self) -> Result<Vec<String>>;

    /// Record `id`. Returns true if it was not present before.
    fn mark_installed(&self, id: &str) -> Result<bool>;

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.installed()?.iter().any(|existing| existing == id))
    }
}

/// Installed set kept in `installed.json` as a plain array of ids.
#[derive(Debug, Clone)]
pub struct JsonInstalledStore {
    file: LockedJsonFile<Vec<String>>,
}

impl JsonInstalledStore {
    pub const FILE_NAME: &'static str = "installed.json";

    /// Store inside `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::at(data_dir.into().join(Self::FILE_NAME))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { file: LockedJsonFile::new(path) }
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

impl InstalledStore for JsonInstalledStore {
    fn installed(&self) -> Result<Vec<String>> {
        Ok(self.file.load()?.unwrap_or_default())
    }

    fn mark_installed(&self, id: &str) -> Result<bool> {
        let added = self.file.update(Vec::new, |ids| {
            if ids.iter().any(|existing| existing == id) {
                false
            } else {
                ids.push(id.to_string());
                true
            }
        })?;

        if added {
            tracing::debug!(id, path = ?self.file.path(), "Recorded installation");
        }
        Ok(added)
    }
}

/// Installed set that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryInstalledStore {
    ids: Mutex<Vec<String>>,
}

impl MemoryInstalledStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            let id = id.into();
            let mut guard = resilient_lock(&store.ids);
            if !guard.contains(&id) {
                guard.push(id);
            }
        }
        store
    }
}

impl InstalledStore for MemoryInstalledStore {
    fn installed(&self) -> Result<Vec<String>> {
        Ok(resilient_lock(&self.ids).clone())
    }

    fn mark_installed(&self, id: &str) -> Result<bool> {
        let mut ids = resilient_lock(&self.ids);
        if ids.iter().any(|existing| existing == id) {
            return Ok(false);
        }
        ids.push(id.to_string());
        Ok(true)
    }
}
