// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Capture-side block pools.
//!
//! The capture thread is the only writer of a pool; the DSP worker is the
//! only reader. Samples are relaxed atomics and the completed-block count
//! is published with release ordering after a slot is full, so a reader
//! that acquires count `n` sees block `n` intact unless the writer has
//! since lapped the whole pool.

use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{BLOCK_SAMPLES, POOL_BLOCKS};

pub struct InputPool {
    slots: Box<[Box<[AtomicI16]>]>,
    completed: AtomicU64,
}

impl InputPool {
    pub fn new() -> Self {
        Self::with_geometry(POOL_BLOCKS, BLOCK_SAMPLES)
    }

    pub fn with_geometry(blocks: usize, block_len: usize) -> Self {
        let slots = (0..blocks.max(1))
            .map(|_| {
                (0..block_len.max(1))
                    .map(|_| AtomicI16::new(0))
                    .collect::<Box<[AtomicI16]>>()
            })
            .collect();
        Self {
            slots,
            completed: AtomicU64::new(0),
        }
    }

    pub fn blocks(&self) -> usize {
        self.slots.len()
    }

    pub fn block_len(&self) -> usize {
        self.slots[0].len()
    }

    /// Number of blocks completed since the pool was created.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Slot holding completed block number `count` (1-based).
    pub fn slot_of(&self, count: u64) -> usize {
        (count.saturating_sub(1) % self.slots.len() as u64) as usize
    }

    /// Copy completed block `count` into `out`, replacing its contents.
    pub fn read_block(&self, count: u64, out: &mut Vec<i16>) {
        let slot = &self.slots[self.slot_of(count)];
        out.clear();
        out.extend(slot.iter().map(|s| s.load(Ordering::Relaxed)));
    }

    fn next_slot(&self) -> &[AtomicI16] {
        let next = self.completed.load(Ordering::Relaxed) % self.slots.len() as u64;
        &self.slots[next as usize]
    }

    fn publish(&self) {
        self.completed.fetch_add(1, Ordering::Release);
    }
}

impl Default for InputPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills a pool from arbitrarily sized capture callbacks.
pub struct CaptureWriter {
    pool: Arc<InputPool>,
    fill: usize,
}

impl CaptureWriter {
    pub fn new(pool: Arc<InputPool>) -> Self {
        Self { pool, fill: 0 }
    }

    pub fn pool(&self) -> &Arc<InputPool> {
        &self.pool
    }

    /// Append samples; returns how many blocks were completed.
    pub fn push(&mut self, mut samples: &[i16]) -> usize {
        let block_len = self.pool.block_len();
        let mut published = 0;
        while !samples.is_empty() {
            let slot = self.pool.next_slot();
            let take = (block_len - self.fill).min(samples.len());
            for (dst, &src) in slot[self.fill..self.fill + take].iter().zip(samples) {
                dst.store(src, Ordering::Relaxed);
            }
            self.fill += take;
            samples = &samples[take..];
            if self.fill == block_len {
                self.pool.publish();
                self.fill = 0;
                published += 1;
            }
        }
        published
    }
}
