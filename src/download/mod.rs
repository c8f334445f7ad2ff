// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download sessions for DriveSoft catalog items.
//!
//! A session walks a fixed phase sequence driven purely by delays, emitting a
//! full snapshot after every change, and records the item in the installed
//! set when it completes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DownloadManager │────▶│ session task    │──▶ watch / merged table
//! │                 │     │ (tokio)         │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │ polls
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Sequencer       │────▶│ SessionMachine  │  + Clock, FaultInjector
//! │                 │     │ (pure steps)    │
//! └────────┬────────┘     └─────────────────┘
//!          ▼
//!   InstalledStore, FileSaver
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivesoft::catalog::{PackageFormat, Software};
//! use drivesoft::download::Sequencer;
//! use drivesoft::store::MemoryInstalledStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let sequencer = Sequencer::new(Arc::new(MemoryInstalledStore::new()));
//! let item = Software::new("42", "Sample", PackageFormat::Zip);
//!
//! let done = sequencer
//!     .run(&item, |s| println!("{} {}%", s.status, s.progress))
//!     .await?;
//! assert_eq!(done.progress, 100);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod fault;
pub mod machine;
pub mod manager;
pub mod sequencer;
pub mod types;

pub use clock::{Clock, TokioClock, VirtualClock};
pub use fault::{FaultInjector, FaultPlan, NoFaults, RandomDrop};
pub use machine::{planned_duration, SessionMachine, Step};
pub use manager::{DownloadHandle, DownloadManager};
pub use sequencer::{Sequencer, SessionStream};
pub use types::{DownloadSession, PhaseTimings, SessionStatus};

/// Why a session did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("catalog item {0:?} has no id")]
    InvalidItem(String),
    #[error("download of {id} failed at {progress}%: {reason}")]
    Failed { id: String, progress: u8, reason: String },
    #[error("download of {0} was interrupted before it finished")]
    Interrupted(String),
}
