// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared output rings: one writer, any number of lossy readers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{Iq, OUTPUT_CAPACITY};

/// Destination of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Network-format channel A (repositioned when enabled).
    NetworkA,
    /// Network-format channel B, a copy of A, or zeros.
    NetworkB,
    /// Soundcard-format channel A, never repositioned.
    SoundcardA,
    SoundcardB,
}

impl Purpose {
    pub const ALL: [Purpose; 4] = [
        Purpose::NetworkA,
        Purpose::NetworkB,
        Purpose::SoundcardA,
        Purpose::SoundcardB,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

struct IqRing {
    i: Box<[AtomicU64]>,
    q: Box<[AtomicU64]>,
}

impl IqRing {
    fn new(capacity: usize) -> Self {
        let make = || {
            (0..capacity)
                .map(|_| AtomicU64::new(0f64.to_bits()))
                .collect::<Box<[AtomicU64]>>()
        };
        Self { i: make(), q: make() }
    }

    #[inline]
    fn store(&self, pos: usize, z: Iq) {
        self.i[pos].store(z.re.to_bits(), Ordering::Relaxed);
        self.q[pos].store(z.im.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    fn load(&self, pos: usize) -> Iq {
        Iq::new(
            f64::from_bits(self.i[pos].load(Ordering::Relaxed)),
            f64::from_bits(self.q[pos].load(Ordering::Relaxed)),
        )
    }
}

/// Four I/Q rings sharing one write index.
///
/// Readers that fall more than one capacity behind silently lose data;
/// the newest samples always win.
pub struct OutputRing {
    rings: [IqRing; 4],
    capacity: usize,
    write: AtomicUsize,
}

impl OutputRing {
    pub fn new() -> Self {
        Self::with_capacity(OUTPUT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            rings: std::array::from_fn(|_| IqRing::new(capacity)),
            capacity,
            write: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_index(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    /// Write `len` samples to each listed purpose, then advance the shared
    /// write index once. Purposes not listed keep their old contents.
    ///
    /// Only the DSP worker may call this.
    pub fn publish(&self, len: usize, writes: &[(Purpose, &[Iq])]) {
        let start = self.write.load(Ordering::Relaxed);
        for (purpose, samples) in writes {
            let ring = &self.rings[purpose.index()];
            let mut pos = start;
            for &z in samples.iter().take(len) {
                ring.store(pos, z);
                pos += 1;
                if pos == self.capacity {
                    pos = 0;
                }
            }
        }
        self.write
            .store((start + len) % self.capacity, Ordering::Release);
    }

    /// Copy of the newest `n` samples of one purpose, oldest first.
    pub fn latest(&self, purpose: Purpose, n: usize) -> Vec<Iq> {
        let n = n.min(self.capacity);
        let w = self.write_index();
        let ring = &self.rings[purpose.index()];
        let start = (w + self.capacity - n) % self.capacity;
        (0..n)
            .map(|k| ring.load((start + k) % self.capacity))
            .collect()
    }

    /// A reader positioned at the current write index.
    pub fn reader(self: &Arc<Self>, purpose: Purpose) -> OutputReader {
        OutputReader {
            ring: Arc::clone(self),
            purpose,
            read: self.write_index(),
        }
    }
}

impl Default for OutputRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Independent read cursor into one purpose of an [`OutputRing`].
pub struct OutputReader {
    ring: Arc<OutputRing>,
    purpose: Purpose,
    read: usize,
}

impl OutputReader {
    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Unread samples, `(write - read) mod capacity`.
    pub fn available(&self) -> usize {
        let cap = self.ring.capacity;
        (self.ring.write_index() + cap - self.read) % cap
    }

    /// Copy up to `out.len()` unread samples; returns how many were copied.
    pub fn read_into(&mut self, out: &mut [Iq]) -> usize {
        let n = self.available().min(out.len());
        let cap = self.ring.capacity;
        let ring = &self.ring.rings[self.purpose.index()];
        for slot in out.iter_mut().take(n) {
            *slot = ring.load(self.read);
            self.read = (self.read + 1) % cap;
        }
        n
    }

    /// Drop everything unread.
    pub fn skip_to_latest(&mut self) {
        self.read = self.ring.write_index();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(start: usize, n: usize) -> Vec<Iq> {
        (start..start + n)
            .map(|k| Iq::new(k as f64, -(k as f64)))
            .collect()
    }

    #[test]
    fn test_reader_sees_published_samples() {
        let ring = Arc::new(OutputRing::with_capacity(16));
        let mut reader = ring.reader(Purpose::NetworkA);
        assert_eq!(reader.available(), 0);

        let data = counter(0, 5);
        ring.publish(5, &[(Purpose::NetworkA, &data[..])]);
        assert_eq!(reader.available(), 5);

        let mut out = vec![Iq::new(0.0, 0.0); 3];
        assert_eq!(reader.read_into(&mut out), 3);
        assert_eq!(out, data[..3].to_vec());
        assert_eq!(reader.available(), 2);
    }

    #[test]
    fn test_shared_index_advances_once() {
        let ring = Arc::new(OutputRing::with_capacity(16));
        let a = counter(0, 4);
        let b = counter(100, 4);
        ring.publish(4, &[(Purpose::NetworkA, &a[..]), (Purpose::NetworkB, &b[..])]);
        assert_eq!(ring.write_index(), 4);
        assert_eq!(ring.latest(Purpose::NetworkB, 4), b);
        // Unwritten purposes still advance with the shared index.
        assert_eq!(ring.latest(Purpose::SoundcardA, 1), vec![Iq::new(0.0, 0.0)]);
    }

    #[test]
    fn test_most_recent_wins() {
        let ring = Arc::new(OutputRing::with_capacity(10));
        let mut slow = ring.reader(Purpose::SoundcardA);
        for block in 0..5 {
            let data = counter(block * 4, 4);
            ring.publish(4, &[(Purpose::SoundcardA, &data[..])]);
        }
        // 20 samples through a 10-slot ring: only the newest survive.
        assert_eq!(ring.latest(Purpose::SoundcardA, 6), counter(14, 6));

        slow.skip_to_latest();
        assert_eq!(slow.available(), 0);
        let data = counter(20, 3);
        ring.publish(3, &[(Purpose::SoundcardA, &data[..])]);
        let mut out = vec![Iq::new(0.0, 0.0); 8];
        assert_eq!(slow.read_into(&mut out), 3);
        assert_eq!(&out[..3], &data[..]);
    }

    #[test]
    fn test_independent_readers() {
        let ring = Arc::new(OutputRing::with_capacity(32));
        let mut r1 = ring.reader(Purpose::NetworkA);
        let r2 = ring.reader(Purpose::NetworkA);
        let data = counter(0, 8);
        ring.publish(8, &[(Purpose::NetworkA, &data[..])]);
        let mut out = vec![Iq::new(0.0, 0.0); 8];
        r1.read_into(&mut out);
        assert_eq!(r1.available(), 0);
        assert_eq!(r2.available(), 8);
    }

    #[test]
    fn test_latest_wraps() {
        let ring = OutputRing::with_capacity(8);
        ring.publish(6, &[(Purpose::NetworkA, counter(0, 6).as_slice())]);
        ring.publish(6, &[(Purpose::NetworkA, counter(6, 6).as_slice())]);
        assert_eq!(ring.write_index(), 4);
        assert_eq!(ring.latest(Purpose::NetworkA, 8), counter(4, 8));
    }
}
