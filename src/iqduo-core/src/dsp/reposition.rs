// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f64::consts::{PI, TAU};

use crate::Iq;

/// Mirrors the passband about fs/2: rotate by a phase advancing π per
/// sample, then swap I and Q.
///
/// The phase lives for the life of the pipeline, so consecutive jobs
/// continue where the previous one stopped.
#[derive(Debug, Clone, Default)]
pub struct Repositioner {
    phase: f64,
}

impl Repositioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    #[inline]
    fn rotate(z: Iq, cos: f64, sin: f64) -> Iq {
        Iq::new(z.re * cos + z.im * sin, z.re * sin - z.im * cos)
    }

    #[inline]
    fn advance(&mut self) -> (f64, f64) {
        self.phase = (self.phase + PI).rem_euclid(TAU);
        (self.phase.cos(), self.phase.sin())
    }

    /// Apply in place to one channel.
    pub fn apply(&mut self, samples: &mut [Iq]) {
        for z in samples {
            let (cos, sin) = self.advance();
            *z = Self::rotate(*z, cos, sin);
        }
    }

    /// Apply in place to both channels with one shared phase per index.
    pub fn apply_pair(&mut self, a: &mut [Iq], b: &mut [Iq]) {
        let n = a.len().max(b.len());
        for i in 0..n {
            let (cos, sin) = self.advance();
            if let Some(z) = a.get_mut(i) {
                *z = Self::rotate(*z, cos, sin);
            }
            if let Some(z) = b.get_mut(i) {
                *z = Self::rotate(*z, cos, sin);
            }
        }
    }
}
