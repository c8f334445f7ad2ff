// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent software registry.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

use super::types::{PackageFormat, Software, UpdateCheck};
use super::CatalogError;
use crate::store::LockedJsonFile;

/// Icon used when a publisher does not supply one.
pub const DEFAULT_ICON_URL: &str = "https://cdn-icons-png.flaticon.com/512/1005/1005141.png";

/// Name used when a publisher does not supply one.
pub const DEFAULT_APP_NAME: &str = "New application";

/// Version used when a publisher does not supply one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Optional metadata for [`CatalogStore::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub update_url: Option<String>,
    pub icon_url: Option<String>,
    /// Author recorded on the new entry
    pub author: String,
}

/// Search constraints for [`CatalogStore::search`].
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Substring matched against name and description; empty matches all
    pub term: String,
    /// Restrict to a single format; `None` means all formats
    pub format: Option<PackageFormat>,
}

impl CatalogFilter {
    pub fn matches(&self, app: &Software) -> bool {
        let term_ok = self.term.is_empty() || app.matches_term(&self.term);
        let format_ok = self.format.map_or(true, |f| app.format == f);
        term_ok && format_ok
    }
}

/// The registry of downloadable packages, kept in `catalog.json`.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    file: LockedJsonFile<Vec<Software>>,
}

impl CatalogStore {
    pub const FILE_NAME: &'static str = "catalog.json";

    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::at(data_dir.into().join(Self::FILE_NAME))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { file: LockedJsonFile::new(path) }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// All packages, newest publication first.
    ///
    /// A missing registry is seeded with the default packages on first read.
    pub fn list(&self) -> Result<Vec<Software>> {
        if let Some(apps) = self.file.load()? {
            return Ok(apps);
        }
        tracing::info!(path = ?self.file.path(), "Seeding catalog with default packages");
        self.file.update(default_catalog, |apps| apps.clone())
    }

    pub fn find(&self, id: &str) -> Result<Option<Software>> {
        Ok(self.list()?.into_iter().find(|app| app.id == id))
    }

    /// Like [`find`](Self::find), but a missing id is an error.
    pub fn get(&self, id: &str) -> Result<Software> {
        self.find(id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()).into())
    }

    pub fn search(&self, filter: &CatalogFilter) -> Result<Vec<Software>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|app| filter.matches(app))
            .collect())
    }

    /// Register a binary as a new package at the front of the registry.
    pub fn publish(&self, request: PublishRequest, binary: &Path) -> Result<Software> {
        let file_name = binary
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CatalogError::UnsupportedFormat(binary.display().to_string()))?
            .to_string();
        let format = PackageFormat::from_file_name(&file_name)?;

        let bytes = fs::read(binary)
            .with_context(|| format!("Failed to read binary {:?}", binary))?;

        let mut app = Software {
            id: String::new(),
            name: request.name.unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            description: request.description.unwrap_or_default(),
            version: request.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            format,
            icon_url: request.icon_url.unwrap_or_else(|| DEFAULT_ICON_URL.to_string()),
            download_url: format!("dls-internal://vault/{}", file_name),
            update_url: request.update_url.unwrap_or_default(),
            update_code: update_code(&bytes),
            author: request.author,
            release_date: Utc::now().date_naive(),
        };

        let published_at = Utc::now().timestamp_millis();
        let app = self.file.update(default_catalog, move |apps| {
            app.id = unused_id(apps, published_at);
            apps.insert(0, app.clone());
            app
        })?;

        tracing::info!(id = %app.id, name = %app.name, format = %app.format, "Published package");
        Ok(app)
    }

    /// Compare `current_version` with the registry entry for `id`.
    ///
    /// Unknown ids report no update.
    pub fn check_update(&self, id: &str, current_version: &str) -> Result<UpdateCheck> {
        Ok(match self.find(id)? {
            Some(app) if app.version != current_version => UpdateCheck {
                update_available: true,
                new_version: Some(app.version),
            },
            _ => UpdateCheck::up_to_date(),
        })
    }
}

/// Millisecond timestamp id, bumped past any id already in `apps`.
fn unused_id(apps: &[Software], millis: i64) -> String {
    let mut candidate = millis;
    while apps.iter().any(|app| app.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// `hash_<first 9 hex chars of sha256>.bin`
fn update_code(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("hash_{}.bin", &digest[..9])
}

/// Packages present on a fresh install.
pub fn default_catalog() -> Vec<Software> {
    vec![
        Software {
            id: "1".to_string(),
            name: "DriveSoft Studio Pro".to_string(),
            description: "IDE for building DriveSoft applications, with full DLS API support.".to_string(),
            version: "1.2.0".to_string(),
            format: PackageFormat::Exe,
            icon_url: DEFAULT_ICON_URL.to_string(),
            download_url: "https://drivesoftware.pl/dl/studio_pro.exe".to_string(),
            update_url: "https://drivesoftware.pl/api/v1/update".to_string(),
            update_code: "studio_v120.dll".to_string(),
            author: "DriveSoft".to_string(),
            release_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap_or_default(),
        },
        Software {
            id: "2".to_string(),
            name: "DLS Gateway Core".to_string(),
            description: "Library for wiring your own sites into the DriveSoft login system.".to_string(),
            version: "1.0.4".to_string(),
            format: PackageFormat::Zip,
            icon_url: "https://cdn-icons-png.flaticon.com/512/919/919853.png".to_string(),
            download_url: "https://drivesoftware.pl/dl/dls_core.zip".to_string(),
            update_url: "https://drivesoftware.pl/api/v1/sync".to_string(),
            update_code: "dls_v104.bin".to_string(),
            author: "DriveSoft".to_string(),
            release_date: NaiveDate::from_ymd_opt(2024, 11, 15).unwrap_or_default(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, CatalogStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = CatalogStore::in_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn test_first_list_seeds_defaults() {
        let (_dir, store) = store();
        let apps = store.list().unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "DriveSoft Studio Pro");
        assert!(store.path().exists(), "seeded catalog should be persisted");
    }

    #[test]
    fn test_search_by_term_and_format() {
        let (_dir, store) = store();

        let zips = store.search(&CatalogFilter { term: String::new(), format: Some(PackageFormat::Zip) }).unwrap();
        assert_eq!(zips.len(), 1);
        assert_eq!(zips[0].id, "2");

        let studio = store.search(&CatalogFilter { term: "STUDIO".to_string(), format: None }).unwrap();
        assert_eq!(studio.len(), 1);
        assert_eq!(studio[0].id, "1");

        let none = store.search(&CatalogFilter { term: "studio".to_string(), format: Some(PackageFormat::Iso) }).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_publish_inserts_at_front() {
        let (dir, store) = store();
        let binary = dir.path().join("Tool Setup.exe");
        fs::write(&binary, b"MZ fake installer").unwrap();

        let app = store
            .publish(
                PublishRequest {
                    name: Some("Tool".to_string()),
                    author: "Tester".to_string(),
                    ..Default::default()
                },
                &binary,
            )
            .unwrap();

        assert_eq!(app.format, PackageFormat::Exe);
        assert_eq!(app.version, DEFAULT_VERSION);
        assert_eq!(app.download_url, "dls-internal://vault/Tool Setup.exe");
        assert!(app.update_code.starts_with("hash_") && app.update_code.ends_with(".bin"));
        assert_eq!(app.update_code.len(), "hash_".len() + 9 + ".bin".len());

        let apps = store.list().unwrap();
        assert_eq!(apps.len(), 3);
        assert_eq!(apps[0].id, app.id);
    }

    #[test]
    fn test_publish_ids_never_collide() {
        let (dir, store) = store();
        let binary = dir.path().join("tool.zip");
        fs::write(&binary, b"PK").unwrap();

        let ids: Vec<String> = (0..5)
            .map(|_| store.publish(PublishRequest::default(), &binary).unwrap().id)
            .collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());

        for id in &ids {
            assert_eq!(&store.get(id).unwrap().id, id);
        }
    }

    #[test]
    fn test_unused_id_skips_taken_timestamps() {
        let taken = vec![
            Software::new("1700000000000", "A", PackageFormat::Exe),
            Software::new("1700000000001", "B", PackageFormat::Zip),
        ];
        assert_eq!(unused_id(&taken, 1_700_000_000_000), "1700000000002");
        assert_eq!(unused_id(&taken, 1_700_000_000_005), "1700000000005");
    }

    #[test]
    fn test_publish_rejects_unknown_extension() {
        let (dir, store) = store();
        let binary = dir.path().join("notes.txt");
        fs::write(&binary, b"hello").unwrap();

        let err = store.publish(PublishRequest::default(), &binary).unwrap_err();
        assert!(err.to_string().contains("txt"));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_check_update() {
        let (_dir, store) = store();
        let check = store.check_update("1", "1.0.0").unwrap();
        assert!(check.update_available);
        assert_eq!(check.new_version.as_deref(), Some("1.2.0"));

        assert_eq!(store.check_update("1", "1.2.0").unwrap(), UpdateCheck::up_to_date());
        assert_eq!(store.check_update("missing", "1.0").unwrap(), UpdateCheck::up_to_date());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("999").unwrap_err();
        assert!(matches!(err.downcast_ref::<CatalogError>(), Some(CatalogError::NotFound(_))));
    }
}
