// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Launching installed packages in the DriveSoft runtime.

use serde::Serialize;

use super::types::Software;
use super::LaunchError;

/// Name reported by the runtime banner.
pub const RUNTIME_NAME: &str = "DriveSoft 1.0 Runtime";

/// What the runtime reports after starting a package.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LaunchReport {
    pub runtime: &'static str,
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub update_code: String,
}

/// Start `app` if it is an installed executable.
///
/// Archives and disk images cannot run directly; they have to be extracted
/// first.
pub fn launch(app: &Software, installed: bool) -> Result<LaunchReport, LaunchError> {
    if !app.format.requires_install() {
        return Err(LaunchError::NotExecutable {
            name: app.name.clone(),
            format: app.format,
        });
    }
    if !installed {
        return Err(LaunchError::NotInstalled(app.id.clone()));
    }

    tracing::info!(id = %app.id, version = %app.version, "Launching package");
    Ok(LaunchReport {
        runtime: RUNTIME_NAME,
        id: app.id.clone(),
        name: app.name.clone(),
        version: app.version.clone(),
        description: app.description.clone(),
        update_code: app.update_code.clone(),
    })
}
