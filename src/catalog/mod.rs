// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Software catalog: package records, the persistent registry and the
//! runtime launcher.

pub mod launch;
pub mod store;
pub mod types;

pub use launch::{launch, LaunchReport, RUNTIME_NAME};
pub use store::{default_catalog, CatalogFilter, CatalogStore, PublishRequest};
pub use types::{PackageFormat, Software, UpdateCheck};

/// Catalog lookups and publication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unsupported package format: {0} (expected exe, zip or iso)")]
    UnsupportedFormat(String),
    #[error("no package with id {0} in the catalog")]
    NotFound(String),
}

/// Reasons a package cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("{name} is a .{format} package and cannot be run directly; extract it first")]
    NotExecutable { name: String, format: PackageFormat },
    #[error("package {0} is not installed; download it first")]
    NotInstalled(String),
}
