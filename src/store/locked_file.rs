// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock-guarded JSON documents on disk.
//!
//! Every store in the crate persists one JSON document next to a `.lock`
//! sibling. Readers take a shared lock, writers an exclusive one, and the
//! exclusive lock is held across the whole read-modify-write so two
//! concurrent updates can never overwrite each other.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default timeout for acquiring file locks (5 seconds)
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry interval when waiting for lock acquisition
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A JSON document of type `T` stored at a fixed path.
#[derive(Debug, Clone)]
pub struct LockedJsonFile<T> {
    path: PathBuf,
    timeout: Duration,
    _doc: PhantomData<fn() -> T>,
}

impl<T> LockedJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: LOCK_TIMEOUT,
            _doc: PhantomData,
        }
    }

    /// Override the lock acquisition timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Read the document under a shared lock. `None` if it was never written.
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lock_file = open_lock_file(&self.lock_path())?;
        acquire_shared_lock_with_timeout(&lock_file, self.timeout)?;

        let doc = self.read_unlocked()?;
        Ok(doc)
    }

    /// Read-modify-write the document as one transaction.
    ///
    /// `init` supplies the document when the file does not exist yet. The
    /// exclusive lock is held until the renamed file is in place.
    pub fn update<R>(
        &self,
        init: impl FnOnce() -> T,
        mutate: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let _guard = acquire_exclusive_lock_with_timeout(&self.lock_path(), self.timeout)?;

        let mut doc = self.read_unlocked()?.unwrap_or_else(init);
        let out = mutate(&mut doc);
        self.write_unlocked(&doc)?;
        Ok(out)
    }

    /// Replace the document wholesale.
    pub fn store(&self, doc: &T) -> Result<()> {
        let _guard = acquire_exclusive_lock_with_timeout(&self.lock_path(), self.timeout)?;
        self.write_unlocked(doc)
    }

    fn read_unlocked(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        Ok(Some(doc))
    }

    /// Temp file + fsync + rename, so a crash never leaves a torn document.
    fn write_unlocked(&self, doc: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(doc)
            .with_context(|| "Failed to serialize document to JSON")?;

        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
            temp_file
                .write_all(content.as_bytes())
                .with_context(|| "Failed to write to temp file")?;
            temp_file
                .sync_all()
                .with_context(|| "Failed to sync temp file to disk")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!("Failed to rename {:?} -> {:?}", temp_path, self.path)
        })?;
        Ok(())
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory for lock file: {:?}", parent))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {:?}", path))
}

/// Acquire an exclusive lock with timeout.
///
/// The returned handle keeps the lock until it is dropped.
pub(crate) fn acquire_exclusive_lock_with_timeout(path: &Path, timeout: Duration) -> Result<File> {
    let lock_file = open_lock_file(path)?;
    let start = Instant::now();

    loop {
        match FileExt::try_lock_exclusive(&lock_file) {
            Ok(()) => return Ok(lock_file),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    bail!(
                        "Timed out waiting for exclusive lock on {:?} after {:?}. \
                         Another drivesoft process may be writing to it.",
                        path,
                        timeout
                    );
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to acquire exclusive lock on {:?}", path));
            }
        }
    }
}

/// Acquire a shared lock with timeout.
pub(crate) fn acquire_shared_lock_with_timeout(file: &File, timeout: Duration) -> Result<()> {
    let start = Instant::now();

    loop {
        match FileExt::try_lock_shared(file) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    bail!(
                        "Timed out waiting for shared lock after {:?}. \
                         Another drivesoft process may be writing to it.",
                        timeout
                    );
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(e).with_context(|| "Failed to acquire shared lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let file: LockedJsonFile<Vec<String>> = LockedJsonFile::new(dir.path().join("missing.json"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_update_initializes_and_persists() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let file: LockedJsonFile<Vec<u32>> = LockedJsonFile::new(dir.path().join("nums.json"));

        let len = file.update(Vec::new, |v| {
            v.push(7);
            v.len()
        }).unwrap();
        assert_eq!(len, 1);
        assert_eq!(file.load().unwrap(), Some(vec![7]));
        assert!(!dir.path().join("nums.tmp").exists(), "temp file should be renamed away");
    }

    #[test]
    fn test_exclusive_lock_times_out_while_held() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lock_path = dir.path().join("held.lock");

        let _held = acquire_exclusive_lock_with_timeout(&lock_path, Duration::from_secs(1))
            .expect("first lock should succeed");

        let start = Instant::now();
        let second = acquire_exclusive_lock_with_timeout(&lock_path, Duration::from_millis(150));
        assert!(second.is_err(), "second exclusive lock should fail while first is held");
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(second.unwrap_err().to_string().contains("Timed out"));
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = Arc::new(dir.path().join("counter.json"));
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let file: LockedJsonFile<u64> =
                        LockedJsonFile::new(path.as_ref().clone()).with_timeout(Duration::from_secs(10));
                    for _ in 0..5 {
                        file.update(|| 0, |n| *n += 1).expect("update should succeed");
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        let file: LockedJsonFile<u64> = LockedJsonFile::new(path.as_ref().clone());
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(file.load().unwrap(), Some(20), "no increment may be lost");
    }
}
