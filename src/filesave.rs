// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Placeholder files handed to the user when a session completes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::catalog::{PackageFormat, Software};

/// Size of every placeholder payload (10 KiB).
pub const PLACEHOLDER_SIZE: usize = 10 * 1024;

/// DOS/PE header signature written at the start of executable placeholders.
pub const EXE_SIGNATURE: [u8; 2] = [0x4D, 0x5A];

/// Saves the artifact for a completed session.
pub trait FileSaver: Send + Sync {
    /// Returns where the file went, or `None` if nothing was written.
    fn save(&self, item: &Software) -> Result<Option<PathBuf>>;
}

/// Zero-filled payload; executables get the `MZ` signature.
pub fn placeholder_payload(format: PackageFormat) -> Vec<u8> {
    let mut payload = vec![0u8; PLACEHOLDER_SIZE];
    if format == PackageFormat::Exe {
        payload[..EXE_SIGNATURE.len()].copy_from_slice(&EXE_SIGNATURE);
    }
    payload
}

/// `<name, lowercased, spaces as underscores>_v<version>.<ext>`
pub fn placeholder_file_name(item: &Software) -> String {
    let stem: String = item
        .name
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .collect::<String>()
        .to_lowercase();
    let stem: String = stem
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    format!("{}_v{}.{}", stem, item.version, item.format.extension())
}

/// Writes placeholders into a download folder.
#[derive(Debug, Clone)]
pub struct DiskFileSaver {
    dir: PathBuf,
}

impl DiskFileSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSaver for DiskFileSaver {
    fn save(&self, item: &Software) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create download folder {:?}", self.dir))?;

        let path = self.dir.join(placeholder_file_name(item));
        fs::write(&path, placeholder_payload(item.format))
            .with_context(|| format!("Failed to write {:?}", path))?;

        tracing::info!(
            id = %item.id,
            path = %path.display(),
            mime = item.format.mime_type(),
            "Saved placeholder package"
        );
        Ok(Some(path))
    }
}

/// Saves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardFileSaver;

impl FileSaver for DiscardFileSaver {
    fn save(&self, _item: &Software) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
