// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! drivesoft - DriveSoft download engine
//!
//! Catalog of downloadable packages, a persisted installed set, and simulated
//! download sessions that walk each package through
//! **connecting** -> **downloading** -> (**installing**) -> **verifying** -> **completed**.
//!
//! # Core Modules
//!
//! - [`download`] - Session state machine, sequencer and background manager
//! - [`catalog`] - Package records, the persistent registry and the launcher
//! - [`store`] - Lock-guarded JSON persistence and the installed set
//! - [`filesave`] - Placeholder files written on completion
//! - [`config`] - User configuration
//! - [`gateway`] - Static gateway descriptors
//! - [`error`] - Consistent error formatting utilities

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod filesave;
pub mod gateway;
pub mod store;

pub use catalog::{CatalogStore, PackageFormat, Software};
pub use config::Config;
pub use download::{
    DownloadError, DownloadHandle, DownloadManager, DownloadSession, Sequencer, SessionStatus,
};
pub use error::{format_error, ErrorBuilder};
pub use filesave::{DiskFileSaver, FileSaver};
pub use store::{InstalledStore, JsonInstalledStore, MemoryInstalledStore};
