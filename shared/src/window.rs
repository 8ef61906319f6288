//! Voting window lifecycle.
//!
//! The window is a pure function of the stored [`VotingWindowState`] and the
//! current instant. Every computation takes `now` explicitly; callers obtain it
//! from a [`Clock`].

use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

use crate::models::{Phase, VotingWindowState, WindowStatus};

pub const MS_PER_MINUTE: i64 = 60_000;

pub trait Clock: Send + Sync {
    /// Epoch milliseconds.
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self { now: AtomicI64::new(now_ms) }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl VotingWindowState {
    pub const fn pending(duration_minutes: i64) -> Self {
        Self { start_time: None, duration_minutes }
    }

    /// Window opened at `now`.
    pub const fn started(now: i64, duration_minutes: i64) -> Self {
        Self { start_time: Some(now), duration_minutes }
    }

    /// Window back-dated so that it ended exactly at `now`.
    pub const fn stopped(now: i64, duration_minutes: i64) -> Self {
        Self {
            start_time: Some(now - duration_minutes * MS_PER_MINUTE),
            duration_minutes,
        }
    }

    pub fn end_time(&self) -> Option<i64> {
        self.start_time.map(|start| start + self.duration_minutes * MS_PER_MINUTE)
    }

    /// Once a start is recorded the window is never pending again, even when
    /// the start lies ahead of `now` (clock skew between writer and reader).
    pub fn phase_at(&self, now: i64) -> Phase {
        match self.end_time() {
            None => Phase::Pending,
            Some(end) if now >= end => Phase::Closed,
            Some(_) => Phase::Active,
        }
    }

    /// Clamped to `0..=duration`.
    pub fn remaining_ms(&self, now: i64) -> i64 {
        self.end_time()
            .map_or(0, |end| (end - now).clamp(0, self.duration_minutes.max(0) * MS_PER_MINUTE))
    }

    pub fn status_at(&self, now: i64) -> WindowStatus {
        let remaining_ms = self.remaining_ms(now);
        WindowStatus {
            phase: self.phase_at(now),
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            end_time: self.end_time(),
            remaining_ms,
            remaining: format_remaining(remaining_ms),
        }
    }
}

pub fn format_remaining(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}
