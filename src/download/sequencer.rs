// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Drives catalog items through their download sessions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};

use super::clock::{Clock, TokioClock};
use super::fault::{FaultInjector, NoFaults};
use super::machine::SessionMachine;
use super::types::{DownloadSession, PhaseTimings, SessionStatus};
use super::DownloadError;
use crate::catalog::Software;
use crate::filesave::{DiscardFileSaver, FileSaver};
use crate::store::InstalledStore;

/// Lazy stream of snapshots for one session. Dropping it cancels the session.
pub type SessionStream = BoxStream<'static, DownloadSession>;

/// Runs download sessions against an installed set.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct Sequencer {
    installed: Arc<dyn InstalledStore>,
    saver: Arc<dyn FileSaver>,
    clock: Arc<dyn Clock>,
    faults: Arc<dyn FaultInjector>,
    timings: PhaseTimings,
}

impl Sequencer {
    /// Real timers, no faults, no file saving.
    pub fn new(installed: Arc<dyn InstalledStore>) -> Self {
        Self {
            installed,
            saver: Arc::new(DiscardFileSaver),
            clock: Arc::new(TokioClock),
            faults: Arc::new(NoFaults),
            timings: PhaseTimings::STANDARD,
        }
    }

    pub fn with_file_saver(mut self, saver: Arc<dyn FileSaver>) -> Self {
        self.saver = saver;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_timings(mut self, timings: PhaseTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn installed_store(&self) -> &Arc<dyn InstalledStore> {
        &self.installed
    }

    /// Start a session for `item` and return its snapshot stream.
    ///
    /// Nothing happens until the stream is polled. Each step's delay runs
    /// when the consumer asks for the following snapshot, so a slow consumer
    /// slows the session down rather than queueing snapshots.
    pub fn session(&self, item: &Software) -> Result<SessionStream, DownloadError> {
        if item.id.trim().is_empty() {
            return Err(DownloadError::InvalidItem(item.name.clone()));
        }

        let driver = Driver {
            machine: SessionMachine::new(item, self.timings),
            item: item.clone(),
            sequencer: self.clone(),
            pending_delay: None,
            last: None,
            done: false,
        };

        let snapshots = stream::unfold(driver, |mut driver| async move {
            let snapshot = driver.advance().await?;
            Some((snapshot, driver))
        });
        Ok(snapshots.boxed())
    }

    /// Run a whole session, calling `observer` with every snapshot.
    ///
    /// Resolves once the session is terminal. On success the item is already
    /// in the installed set.
    pub async fn run<F>(&self, item: &Software, mut observer: F) -> Result<DownloadSession, DownloadError>
    where
        F: FnMut(&DownloadSession),
    {
        let mut snapshots = self.session(item)?;
        let mut last = None;
        while let Some(snapshot) = snapshots.next().await {
            observer(&snapshot);
            last = Some(snapshot);
        }
        finish(&item.id, last)
    }
}

/// Map the last snapshot of a session to its outcome.
pub(crate) fn finish(id: &str, last: Option<DownloadSession>) -> Result<DownloadSession, DownloadError> {
    match last {
        Some(session) if session.status == SessionStatus::Completed => Ok(session),
        Some(session) if session.status == SessionStatus::Failed => Err(DownloadError::Failed {
            id: session.id,
            progress: session.progress,
            reason: session.error.unwrap_or_default(),
        }),
        _ => Err(DownloadError::Interrupted(id.to_string())),
    }
}

/// Per-session state carried between polls of the stream.
struct Driver {
    item: Software,
    machine: SessionMachine,
    sequencer: Sequencer,
    pending_delay: Option<Duration>,
    last: Option<DownloadSession>,
    done: bool,
}

impl Driver {
    async fn advance(&mut self) -> Option<DownloadSession> {
        if self.done {
            return None;
        }
        if let Some(delay) = self.pending_delay.take() {
            self.sequencer.clock.sleep(delay).await;
        }

        let step = self.machine.next()?;
        let snapshot = step.snapshot;

        if self.last.is_none() {
            tracing::info!(id = %self.item.id, name = %self.item.name, format = %self.item.format, "Download session started");
        }

        if let Some(reason) = self.sequencer.faults.check(&snapshot) {
            return Some(self.fail(snapshot, reason));
        }

        if snapshot.status == SessionStatus::Completed {
            if let Err(e) = self.complete() {
                return Some(self.fail(snapshot, format!("could not record installation: {:#}", e)));
            }
            self.done = true;
            tracing::info!(id = %self.item.id, "Download session completed");
        } else {
            tracing::debug!(id = %self.item.id, status = %snapshot.status, progress = snapshot.progress, "Session step");
        }

        self.pending_delay = step.delay_after;
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Record the installation, then hand the placeholder to the saver.
    fn complete(&self) -> anyhow::Result<()> {
        let added = self.sequencer.installed.mark_installed(&self.item.id)?;
        if !added {
            tracing::debug!(id = %self.item.id, "Item was already installed");
        }

        if let Err(e) = self.sequencer.saver.save(&self.item) {
            tracing::warn!(id = %self.item.id, "Failed to save placeholder package: {:#}", e);
        }
        Ok(())
    }

    /// Terminal `failed` snapshot at the last emitted progress.
    fn fail(&mut self, attempted: DownloadSession, reason: String) -> DownloadSession {
        self.done = true;
        let failed = self.last.take().unwrap_or(attempted).failed(reason);
        tracing::warn!(
            id = %self.item.id,
            progress = failed.progress,
            "Download session failed: {}",
            failed.error.as_deref().unwrap_or_default()
        );
        self.last = Some(failed.clone());
        failed
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.done && self.last.is_some() {
            tracing::info!(id = %self.item.id, remaining = self.machine.remaining(), "Download session cancelled");
        }
    }
}
