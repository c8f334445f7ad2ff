// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The session state machine, without any timers.
//!
//! ```text
//! connecting(0) ─▶ downloading(0..=70 by 10) ─┬─▶ verifying(98) ─▶ completed(100)
//!                                             │        ▲
//!                         exe only ─▶ installing(71..=95 by 5)
//! ```

use std::time::Duration;

use super::types::{DownloadSession, PhaseTimings, SessionStatus};
use crate::catalog::Software;

/// Last progress value of the `downloading` phase.
pub const DOWNLOAD_END: u8 = 70;
/// Progress increment per `downloading` step.
pub const DOWNLOAD_STEP: u8 = 10;
/// First progress value of the `installing` phase.
pub const INSTALL_START: u8 = 71;
/// Upper bound for `installing` progress.
pub const INSTALL_END: u8 = 95;
/// Progress increment per `installing` step.
pub const INSTALL_STEP: u8 = 5;
/// Progress reported while verifying.
pub const VERIFY_PROGRESS: u8 = 98;

/// One snapshot to emit and how long to wait before the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub snapshot: DownloadSession,
    /// `None` only for the final `completed` step
    pub delay_after: Option<Duration>,
}

/// Iterator over the steps of one session.
#[derive(Debug)]
pub struct SessionMachine {
    steps: std::vec::IntoIter<Step>,
}

impl SessionMachine {
    pub fn new(item: &Software, timings: PhaseTimings) -> Self {
        let start = DownloadSession::start(item);
        let mut steps = Vec::with_capacity(16);

        steps.push(Step {
            snapshot: start.clone(),
            delay_after: Some(timings.connect),
        });

        for progress in (0..=DOWNLOAD_END).step_by(DOWNLOAD_STEP as usize) {
            steps.push(Step {
                snapshot: start.advanced(SessionStatus::Downloading, progress),
                delay_after: Some(timings.download_step),
            });
        }

        if item.format.requires_install() {
            for progress in (INSTALL_START..=INSTALL_END).step_by(INSTALL_STEP as usize) {
                steps.push(Step {
                    snapshot: start.advanced(SessionStatus::Installing, progress),
                    delay_after: Some(timings.install_step),
                });
            }
        }

        steps.push(Step {
            snapshot: start.advanced(SessionStatus::Verifying, VERIFY_PROGRESS),
            delay_after: Some(timings.verify),
        });
        steps.push(Step {
            snapshot: start.advanced(SessionStatus::Completed, 100),
            delay_after: None,
        });

        Self { steps: steps.into_iter() }
    }

    /// Steps not yet taken.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Iterator for SessionMachine {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        self.steps.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

/// Total time a session with these timings takes for `item`.
pub fn planned_duration(item: &Software, timings: PhaseTimings) -> Duration {
    SessionMachine::new(item, timings)
        .filter_map(|step| step.delay_after)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PackageFormat;

    fn trace(format: PackageFormat) -> Vec<(SessionStatus, u8)> {
        let item = Software::new("x", "X", format);
        SessionMachine::new(&item, PhaseTimings::STANDARD)
            .map(|s| (s.snapshot.status, s.snapshot.progress))
            .collect()
    }

    #[test]
    fn test_zip_has_no_install_phase() {
        let steps = trace(PackageFormat::Zip);
        assert_eq!(steps.first(), Some(&(SessionStatus::Connecting, 0)));
        assert_eq!(steps.len(), 1 + 8 + 1 + 1);
        assert!(steps.iter().all(|(s, _)| *s != SessionStatus::Installing));
        assert_eq!(steps[steps.len() - 2], (SessionStatus::Verifying, 98));
        assert_eq!(steps.last(), Some(&(SessionStatus::Completed, 100)));
    }

    #[test]
    fn test_exe_install_progress_values() {
        let installs: Vec<u8> = trace(PackageFormat::Exe)
            .into_iter()
            .filter(|(s, _)| *s == SessionStatus::Installing)
            .map(|(_, p)| p)
            .collect();
        assert_eq!(installs, vec![71, 76, 81, 86, 91]);
    }

    #[test]
    fn test_only_completed_has_no_delay() {
        let item = Software::new("x", "X", PackageFormat::Iso);
        let steps: Vec<Step> = SessionMachine::new(&item, PhaseTimings::STANDARD).collect();
        let (last, rest) = steps.split_last().unwrap();
        assert!(last.delay_after.is_none());
        assert!(rest.iter().all(|s| s.delay_after.is_some()));
    }

    #[test]
    fn test_planned_duration() {
        let zip = Software::new("z", "Z", PackageFormat::Zip);
        let exe = Software::new("e", "E", PackageFormat::Exe);
        assert_eq!(planned_duration(&zip, PhaseTimings::STANDARD), Duration::from_millis(600 + 800 + 800));
        assert_eq!(planned_duration(&exe, PhaseTimings::STANDARD), Duration::from_millis(600 + 800 + 1000 + 800));
    }
}
