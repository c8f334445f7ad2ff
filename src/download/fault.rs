// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Failure injection for download sessions.
//!
//! Sessions cannot fail on their own. An injector is consulted before each
//! snapshot is emitted; returning a reason turns that snapshot into the
//! terminal `failed` one.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::{DownloadSession, SessionStatus};
use crate::store::resilient_lock;

pub trait FaultInjector: Send + Sync {
    /// Reason to fail instead of emitting `next`, if any.
    fn check(&self, next: &DownloadSession) -> Option<String>;
}

/// The default: sessions always run to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn check(&self, _next: &DownloadSession) -> Option<String> {
        None
    }
}

/// Fail deterministically at a given phase, optionally at a given progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPlan {
    pub status: SessionStatus,
    pub progress: Option<u8>,
    pub reason: String,
}

impl FaultPlan {
    pub fn at(status: SessionStatus, progress: Option<u8>) -> Self {
        Self {
            status,
            progress,
            reason: format!("injected failure during {}", status),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

impl FaultInjector for FaultPlan {
    fn check(&self, next: &DownloadSession) -> Option<String> {
        let status_hit = next.status == self.status;
        let progress_hit = self.progress.map_or(true, |p| next.progress == p);
        (status_hit && progress_hit).then(|| self.reason.clone())
    }
}

/// Parses `STATUS` or `STATUS:PROGRESS`, e.g. `downloading:40`.
impl FromStr for FaultPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (status, progress) = match s.split_once(':') {
            Some((status, progress)) => {
                let progress = progress
                    .trim()
                    .parse::<u8>()
                    .map_err(|e| format!("invalid progress {:?}: {}", progress, e))?;
                (status, Some(progress))
            }
            None => (s, None),
        };
        let status: SessionStatus = status.parse()?;
        if status.is_terminal() {
            return Err(format!("cannot inject a failure at terminal status {}", status));
        }
        Ok(FaultPlan::at(status, progress))
    }
}

impl fmt::Display for FaultPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.progress {
            Some(p) => write!(f, "{}:{}", self.status, p),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Simulated network drop: each `downloading` step fails with `probability`.
#[derive(Debug)]
pub struct RandomDrop {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomDrop {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible variant for tests.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl FaultInjector for RandomDrop {
    fn check(&self, next: &DownloadSession) -> Option<String> {
        if next.status != SessionStatus::Downloading {
            return None;
        }
        let roll: f64 = resilient_lock(&self.rng).gen();
        (roll < self.probability).then(|| format!("connection dropped at {}%", next.progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PackageFormat, Software};

    fn snapshot(status: SessionStatus, progress: u8) -> DownloadSession {
        DownloadSession::start(&Software::new("1", "A", PackageFormat::Exe)).advanced(status, progress)
    }

    #[test]
    fn test_fault_plan_matches_status_and_progress() {
        let plan = FaultPlan::at(SessionStatus::Downloading, Some(40));
        assert!(plan.check(&snapshot(SessionStatus::Downloading, 30)).is_none());
        assert!(plan.check(&snapshot(SessionStatus::Downloading, 40)).is_some());

        let any_install = FaultPlan::at(SessionStatus::Installing, None);
        assert!(any_install.check(&snapshot(SessionStatus::Installing, 71)).is_some());
    }

    #[test]
    fn test_fault_plan_parse() {
        let plan: FaultPlan = "downloading:40".parse().unwrap();
        assert_eq!(plan.status, SessionStatus::Downloading);
        assert_eq!(plan.progress, Some(40));
        assert_eq!(plan.to_string(), "downloading:40");

        assert!("completed".parse::<FaultPlan>().is_err());
        assert!("verifying:x".parse::<FaultPlan>().is_err());
    }

    #[test]
    fn test_random_drop_extremes() {
        let never = RandomDrop::seeded(0.0, 1);
        let always = RandomDrop::seeded(1.0, 1);
        let step = snapshot(SessionStatus::Downloading, 10);
        assert!(never.check(&step).is_none());
        assert!(always.check(&step).is_some());
        assert!(always.check(&snapshot(SessionStatus::Verifying, 98)).is_none());
    }
}
