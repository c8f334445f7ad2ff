// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delay sources for session phases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::store::resilient_lock;

/// Something that can wait.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real timers via `tokio::time::sleep`.
///
/// Honors `tokio::time::pause`, so tests on a paused runtime still finish
/// instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Clock that never waits and keeps a ledger of requested delays.
#[derive(Debug, Default)]
pub struct VirtualClock {
    elapsed_ms: AtomicU64,
    delays: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total virtual time that has passed.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }

    /// Every delay requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        resilient_lock(&self.delays).clone()
    }
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms.fetch_add(millis, Ordering::SeqCst);
        resilient_lock(&self.delays).push(duration);
        future::ready(()).boxed()
    }
}
