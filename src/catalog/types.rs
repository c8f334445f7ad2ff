// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Catalog record types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::CatalogError;

/// Package kind of a catalog item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Windows installer; the only format with an install phase
    Exe,
    /// Zip archive
    Zip,
    /// Disk image
    Iso,
}

impl PackageFormat {
    /// All known formats, in display order.
    pub const ALL: [PackageFormat; 3] = [PackageFormat::Exe, PackageFormat::Zip, PackageFormat::Iso];

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            PackageFormat::Exe => "exe",
            PackageFormat::Zip => "zip",
            PackageFormat::Iso => "iso",
        }
    }

    /// MIME type used when the placeholder file is handed to the user.
    pub fn mime_type(&self) -> &'static str {
        match self {
            PackageFormat::Exe => "application/x-msdownload",
            PackageFormat::Iso => "application/x-iso9660-image",
            PackageFormat::Zip => "application/zip",
        }
    }

    /// Returns true if sessions for this format run the `installing` phase.
    pub fn requires_install(&self) -> bool {
        matches!(self, PackageFormat::Exe)
    }

    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Result<Self, CatalogError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .ok_or_else(|| CatalogError::UnsupportedFormat(name.to_string()))?;
        ext.parse()
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for PackageFormat {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exe" => Ok(PackageFormat::Exe),
            "zip" => Ok(PackageFormat::Zip),
            "iso" => Ok(PackageFormat::Iso),
            other => Err(CatalogError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A downloadable package record in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Software {
    /// Unique identifier; download sessions reuse it
    pub id: String,
    /// Display name
    pub name: String,
    /// Short description shown in listings
    pub description: String,
    /// Published version string (compared verbatim by update checks)
    pub version: String,
    /// Package kind
    pub format: PackageFormat,
    /// Icon reference
    pub icon_url: String,
    /// Where the binary lives
    pub download_url: String,
    /// Update endpoint advertised by the publisher
    pub update_url: String,
    /// Content tag of the published binary
    pub update_code: String,
    /// Publisher name
    pub author: String,
    /// Release day
    pub release_date: NaiveDate,
}

impl Software {
    /// Minimal record, mostly useful for tests and ad-hoc sessions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, format: PackageFormat) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            format,
            icon_url: String::new(),
            download_url: String::new(),
            update_url: String::new(),
            update_code: String::new(),
            author: String::new(),
            release_date: chrono::Utc::now().date_naive(),
        }
    }

    /// Case-insensitive substring match on name or description.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.description.to_lowercase().contains(&term)
    }
}

/// Result of comparing an installed version against the registry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
}

impl UpdateCheck {
    pub fn up_to_date() -> Self {
        Self { update_available: false, new_version: None }
    }
}
