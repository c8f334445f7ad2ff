// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download session types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{PackageFormat, Software};

/// Phase of a download session.
///
/// Declared in the order sessions move through them, except `Failed`, which
/// can follow any non-terminal phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Opening the transfer
    Connecting,
    /// Transferring bytes
    Downloading,
    /// Running the installer (exe only)
    Installing,
    /// Checking integrity
    Verifying,
    /// Done; the item is in the installed set
    Completed,
    /// Stopped by an injected fault or a persistence error
    Failed,
}

impl SessionStatus {
    /// Returns true once the session can emit nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Returns true while the session is still moving.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Downloading => "downloading",
            SessionStatus::Installing => "installing",
            SessionStatus::Verifying => "verifying",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connecting" => Ok(SessionStatus::Connecting),
            "downloading" => Ok(SessionStatus::Downloading),
            "installing" => Ok(SessionStatus::Installing),
            "verifying" => Ok(SessionStatus::Verifying),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Full snapshot of one download session.
///
/// Observers always receive whole snapshots, never deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadSession {
    /// Catalog item id
    pub id: String,
    /// Display name, fixed at session start
    pub name: String,
    /// Percentage, 0-100
    pub progress: u8,
    /// Current phase
    pub status: SessionStatus,
    /// Package kind, fixed at session start
    pub format: PackageFormat,
    /// Failure reason; only set on `failed` snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadSession {
    /// Fresh session for `item`, in `connecting` at 0%.
    pub fn start(item: &Software) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            progress: 0,
            status: SessionStatus::Connecting,
            format: item.format,
            error: None,
        }
    }

    /// Copy of this snapshot moved to `status` at `progress`.
    pub fn advanced(&self, status: SessionStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            error: None,
            ..self.clone()
        }
    }

    /// Copy of this snapshot marked failed, keeping the last progress.
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Failed,
            error: Some(reason.into()),
            ..self.clone()
        }
    }

    /// One-line human summary, e.g. `Sample: downloading 40%`.
    pub fn summary(&self) -> String {
        match &self.error {
            Some(reason) => format!("{}: {} at {}% ({})", self.name, self.status, self.progress, reason),
            None => format!("{}: {} {}%", self.name, self.status, self.progress),
        }
    }
}

/// Delays between session steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Pause after the `connecting` snapshot
    pub connect: Duration,
    /// Pause after each `downloading` step
    pub download_step: Duration,
    /// Pause after each `installing` step
    pub install_step: Duration,
    /// Pause after the `verifying` snapshot
    pub verify: Duration,
}

impl PhaseTimings {
    /// The fixed timings every session uses.
    pub const STANDARD: PhaseTimings = PhaseTimings {
        connect: Duration::from_millis(600),
        download_step: Duration::from_millis(100),
        install_step: Duration::from_millis(200),
        verify: Duration::from_millis(800),
    };
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Installing.is_active());
        assert!(!SessionStatus::Verifying.is_terminal());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let item = Software::new("42", "Sample", PackageFormat::Zip);
        let json = serde_json::to_value(DownloadSession::start(&item)).unwrap();
        assert_eq!(json["status"], "connecting");
        assert_eq!(json["format"], "zip");
        assert_eq!(json["progress"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_keeps_progress() {
        let item = Software::new("7", "App", PackageFormat::Exe);
        let session = DownloadSession::start(&item).advanced(SessionStatus::Downloading, 30);
        let failed = session.failed("network dropped");
        assert_eq!(failed.progress, 30);
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.summary(), "App: failed at 30% (network dropped)");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Installing".parse::<SessionStatus>().unwrap(), SessionStatus::Installing);
        assert!("paused".parse::<SessionStatus>().is_err());
    }
}
