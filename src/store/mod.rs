// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistence for drivesoft.
//!
//! State is a handful of small JSON documents under the data directory:
//!
//! ```text
//! ~/.drivesoft/
//! ├── config.json
//! ├── catalog.json     (+ catalog.lock)
//! └── installed.json   (+ installed.lock)
//! ```
//!
//! Each document is guarded by a sibling `.lock` file (see [`locked_file`]),
//! so updates from concurrent sessions or processes are serialized.

pub mod installed;
pub mod locked_file;
pub mod locks;

pub use installed::{InstalledStore, JsonInstalledStore, MemoryInstalledStore};
pub use locked_file::{LockedJsonFile, LOCK_TIMEOUT};
pub use locks::{resilient_lock, resilient_read, resilient_write};
