// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download manager for running several sessions in the background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::StreamExt;
use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use super::sequencer::{finish, Sequencer};
use super::types::DownloadSession;
use super::DownloadError;
use crate::catalog::Software;
use crate::store::{resilient_read, resilient_write};

/// Latest snapshot per item id, in the order items were first started.
type SessionTable = Arc<RwLock<IndexMap<String, DownloadSession>>>;

/// Handle to a running session.
#[derive(Debug)]
pub struct DownloadHandle {
    /// Item being downloaded
    pub id: String,
    progress_rx: watch::Receiver<DownloadSession>,
    task: JoinHandle<Result<DownloadSession, DownloadError>>,
    tracker: Arc<Tracker>,
}

impl DownloadHandle {
    /// Latest snapshot.
    pub fn progress(&self) -> DownloadSession {
        self.progress_rx.borrow().clone()
    }

    /// Check if the session reached `completed` or `failed`.
    pub fn is_finished(&self) -> bool {
        self.progress_rx.borrow().status.is_terminal()
    }

    /// A fresh receiver for the snapshot channel.
    pub fn subscribe(&self) -> watch::Receiver<DownloadSession> {
        self.progress_rx.clone()
    }

    /// Snapshots as a stream, starting with the current one.
    ///
    /// Intermediate snapshots can be skipped if the consumer is slower than
    /// the session; the terminal one is always delivered.
    pub fn updates(&self) -> WatchStream<DownloadSession> {
        WatchStream::new(self.progress_rx.clone())
    }

    /// Stop the session and drop its row from the manager table.
    ///
    /// No snapshot is merged after this returns. A session that was already
    /// recording its completion when `cancel` ran may still reach the
    /// installed set.
    pub fn cancel(&self) {
        self.tracker.cancel();
        self.task.abort();
        tracing::info!(id = %self.id, "Download cancelled");
    }

    /// Wait for the session to finish.
    pub async fn wait(self) -> Result<DownloadSession, DownloadError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!(id = %self.id, "Download task panicked: {}", e);
                }
                Err(DownloadError::Interrupted(self.id))
            }
        }
    }
}

/// Runs sessions as tokio tasks and keeps a merged view of them.
///
/// Snapshots are merged by item id: a second session for the same id
/// replaces the first one's entry instead of adding a row. Nothing stops two
/// sessions for one id from running at the same time.
pub struct DownloadManager {
    sequencer: Sequencer,
    sessions: SessionTable,
}

impl DownloadManager {
    pub fn new(sequencer: Sequencer) -> Self {
        Self {
            sequencer,
            sessions: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Start downloading `item` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, item: &Software) -> Result<DownloadHandle, DownloadError> {
        let mut snapshots = self.sequencer.session(item)?;
        let (progress_tx, progress_rx) = watch::channel(DownloadSession::start(item));

        let id = item.id.clone();
        let tracker = Arc::new(Tracker::new(&id, Arc::clone(&self.sessions)));
        let task = tokio::spawn({
            let id = id.clone();
            let tracker = Arc::clone(&tracker);
            async move {
                let mut last = None;
                while let Some(snapshot) = snapshots.next().await {
                    if !tracker.record(&snapshot) {
                        tracing::debug!(id = %id, status = %snapshot.status, "Dropping snapshot of cancelled session");
                        if snapshot.status.is_terminal() {
                            last = Some(snapshot);
                        }
                        break;
                    }
                    progress_tx.send_replace(snapshot.clone());
                    last = Some(snapshot);
                }
                finish(&id, last)
            }
        });

        tracing::debug!(id = %id, "Queued download session");
        Ok(DownloadHandle {
            id,
            progress_rx,
            task,
            tracker,
        })
    }

    /// Latest snapshot for `id`.
    pub fn get(&self, id: &str) -> Option<DownloadSession> {
        resilient_read(&self.sessions).get(id).cloned()
    }

    /// Every known session, in first-started order.
    pub fn sessions(&self) -> Vec<DownloadSession> {
        resilient_read(&self.sessions).values().cloned().collect()
    }

    /// Sessions that have not reached a terminal status.
    pub fn active_downloads(&self) -> Vec<DownloadSession> {
        resilient_read(&self.sessions)
            .values()
            .filter(|s| s.status.is_active())
            .cloned()
            .collect()
    }

    /// Drop terminal sessions from the table. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut sessions = resilient_write(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, s| s.status.is_active());
        before - sessions.len()
    }
}

/// One session's view of the shared table.
///
/// The cancelled flag is only read and written under the table's write lock,
/// so a cancel and a merge never interleave.
#[derive(Debug)]
struct Tracker {
    id: String,
    sessions: SessionTable,
    cancelled: AtomicBool,
}

impl Tracker {
    fn new(id: &str, sessions: SessionTable) -> Self {
        Self {
            id: id.to_string(),
            sessions,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Replace the entry for the snapshot's id, or append it.
    ///
    /// Returns false once the session has been cancelled.
    fn record(&self, snapshot: &DownloadSession) -> bool {
        let mut sessions = resilient_write(&self.sessions);
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        sessions.insert(snapshot.id.clone(), snapshot.clone());
        true
    }

    fn cancel(&self) {
        let mut sessions = resilient_write(&self.sessions);
        self.cancelled.store(true, Ordering::SeqCst);
        let still_active = sessions
            .get(&self.id)
            .map_or(false, |s| s.status.is_active());
        if still_active {
            sessions.shift_remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PackageFormat;
    use crate::download::clock::VirtualClock;
    use crate::download::types::SessionStatus;
    use crate::store::{InstalledStore, MemoryInstalledStore};

    fn manager() -> (Arc<MemoryInstalledStore>, DownloadManager) {
        let store = Arc::new(MemoryInstalledStore::new());
        let seq = Sequencer::new(store.clone()).with_clock(Arc::new(VirtualClock::new()));
        (store, DownloadManager::new(seq))
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let (store, manager) = manager();
        let handle = manager.start(&Software::new("1", "Studio", PackageFormat::Exe)).unwrap();

        let done = handle.wait().await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(store.contains("1").unwrap());
        assert_eq!(manager.get("1").unwrap().progress, 100);
        assert!(manager.active_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_same_id_merges_into_one_entry() {
        let (store, manager) = manager();
        let item = Software::new("5", "Twice", PackageFormat::Zip);

        let first = manager.start(&item).unwrap();
        let second = manager.start(&item).unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert_eq!(manager.sessions().len(), 1);
        assert_eq!(store.installed().unwrap(), vec!["5".to_string()]);
    }

    #[tokio::test]
    async fn test_sessions_keep_start_order() {
        let (_store, manager) = manager();
        let a = manager.start(&Software::new("a", "A", PackageFormat::Iso)).unwrap();
        a.wait().await.unwrap();
        let b = manager.start(&Software::new("b", "B", PackageFormat::Zip)).unwrap();
        b.wait().await.unwrap();

        let ids: Vec<String> = manager.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(manager.clear_finished(), 2);
        assert!(manager.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_item_uninstalled() {
        let store = Arc::new(MemoryInstalledStore::new());
        let manager = DownloadManager::new(Sequencer::new(store.clone()));
        let handle = manager.start(&Software::new("9", "Slow", PackageFormat::Exe)).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(700)).await;
        handle.cancel();
        assert!(matches!(handle.wait().await, Err(DownloadError::Interrupted(_))));

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(!store.contains("9").unwrap());
        assert!(manager.get("9").is_none());
    }

    #[test]
    fn test_snapshot_after_cancel_is_not_merged() {
        let sessions: SessionTable = Arc::new(RwLock::new(IndexMap::new()));
        let tracker = Tracker::new("9", Arc::clone(&sessions));
        let started = DownloadSession::start(&Software::new("9", "Slow", PackageFormat::Exe));

        assert!(tracker.record(&started.advanced(SessionStatus::Downloading, 10)));
        tracker.cancel();
        assert!(resilient_read(&sessions).get("9").is_none());

        // A poll that was already running when cancel happened.
        assert!(!tracker.record(&started.advanced(SessionStatus::Downloading, 20)));
        assert!(resilient_read(&sessions).get("9").is_none());
    }

    #[test]
    fn test_cancel_keeps_terminal_row() {
        let sessions: SessionTable = Arc::new(RwLock::new(IndexMap::new()));
        let tracker = Tracker::new("4", Arc::clone(&sessions));
        let started = DownloadSession::start(&Software::new("4", "Done", PackageFormat::Zip));

        assert!(tracker.record(&started.advanced(SessionStatus::Completed, 100)));
        tracker.cancel();
        assert_eq!(resilient_read(&sessions).get("4").unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_running_leaves_no_active_row() {
        let (_store, manager) = manager();
        for i in 0..50 {
            let handle = manager.start(&Software::new(format!("c{}", i), "Racy", PackageFormat::Exe)).unwrap();
            tokio::task::yield_now().await;
            handle.cancel();
            let _ = handle.wait().await;
        }
        assert!(manager.active_downloads().is_empty());
    }
}
