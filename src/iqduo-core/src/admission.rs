// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Job admission: decides on each tick whether a new block gets processed.
//!
//! Blocks that complete while the worker is idle are processed in order,
//! oldest first. Blocks that complete while a job runs are skipped, not
//! queued, so an overloaded worker sheds load instead of falling further
//! behind.

use std::collections::VecDeque;
use std::fmt;

use crate::POOL_BLOCKS;

/// Whether a job is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
}

/// A block cleared for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmittedBlock {
    /// Channel A block number (1-based completed count).
    pub count: u64,
    /// Pending blocks dropped because the capture side overwrote them.
    pub skipped: u64,
    /// `(a, b)` when channel B disagrees with A in dual mode.
    pub mismatch: Option<(u64, u64)>,
}

/// Outcome of one admission poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Disabled,
    Busy,
    NoNewBlock,
    Admit(AdmittedBlock),
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Busy => write!(f, "busy"),
            Self::NoNewBlock => write!(f, "no new block"),
            Self::Admit(block) => write!(f, "admit block {}", block.count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobAdmission {
    state: JobState,
    last_consumed: u64,
    /// Highest block number either queued or discarded.
    seen_through: u64,
    pending: VecDeque<u64>,
    depth: u64,
}

impl Default for JobAdmission {
    fn default() -> Self {
        Self::new(0)
    }
}

impl JobAdmission {
    /// Start with everything up to `completed` already consumed, so stale
    /// pool contents are never processed.
    pub fn new(completed: u64) -> Self {
        Self::with_depth(completed, POOL_BLOCKS)
    }

    /// `depth` is the number of slots in the input pool; a pending block
    /// older than that has been overwritten and is dropped.
    pub fn with_depth(completed: u64, depth: usize) -> Self {
        Self {
            state: JobState::Idle,
            last_consumed: completed,
            seen_through: completed,
            pending: VecDeque::new(),
            depth: depth.max(2) as u64,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn last_consumed(&self) -> u64 {
        self.last_consumed
    }

    /// Blocks waiting to be admitted.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Check whether a job may start. `latest_b` is `Some` only in dual mode.
    ///
    /// Admits the oldest unconsumed block and moves to `Running`; the caller
    /// must follow up with [`JobAdmission::complete`].
    pub fn poll(&mut self, enabled: bool, latest_a: u64, latest_b: Option<u64>) -> Admission {
        if !enabled {
            return Admission::Disabled;
        }
        if self.state == JobState::Running {
            return Admission::Busy;
        }
        if latest_a > self.seen_through {
            self.pending.extend(self.seen_through + 1..=latest_a);
            self.seen_through = latest_a;
        }

        // The slot of block `latest_a + 1 - depth` is the one being refilled.
        let oldest_valid = (latest_a + 2).saturating_sub(self.depth);
        let mut skipped = 0;
        while self.pending.front().is_some_and(|&k| k < oldest_valid) {
            self.pending.pop_front();
            skipped += 1;
        }
        let Some(count) = self.pending.pop_front() else {
            return Admission::NoNewBlock;
        };

        let mismatch = match latest_b {
            Some(b) if b != latest_a => Some((latest_a, b)),
            _ => None,
        };
        self.last_consumed = count;
        self.state = JobState::Running;
        Admission::Admit(AdmittedBlock {
            count,
            skipped,
            mismatch,
        })
    }

    /// Finish the running job. Blocks completed while it ran are marked
    /// consumed; returns how many that discarded. Blocks queued before the
    /// job started stay pending.
    pub fn complete(&mut self, latest_a_now: u64) -> u64 {
        self.state = JobState::Idle;
        let discarded = latest_a_now.saturating_sub(self.seen_through);
        self.seen_through = self.seen_through.max(latest_a_now);
        discarded
    }

    /// Forget everything up to `completed`, e.g. after re-enabling.
    pub fn resync(&mut self, completed: u64) {
        self.pending.clear();
        self.last_consumed = completed;
        self.seen_through = completed;
    }
}
