// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f64::consts::{PI, TAU};

use crate::Iq;

/// LO phase step per input sample: 0.45π rad, i.e. 450 kHz at 2 MHz.
pub const LO_PHASE_INCREMENT: f64 = 0.45 * PI;
/// Table period. 40 × 0.45π = 18π, so the table wraps seamlessly.
pub const LO_TABLE_LEN: usize = 40;

/// One period of the LO for both channels, stored as `sin` and `-cos`.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorTable {
    pub sin_a: [f64; LO_TABLE_LEN],
    pub cos_a: [f64; LO_TABLE_LEN],
    pub sin_b: [f64; LO_TABLE_LEN],
    pub cos_b: [f64; LO_TABLE_LEN],
}

fn fill(start_phase: f64, sin: &mut [f64; LO_TABLE_LEN], cos: &mut [f64; LO_TABLE_LEN]) {
    let mut phase = start_phase.rem_euclid(TAU);
    for i in 0..LO_TABLE_LEN {
        sin[i] = phase.sin();
        cos[i] = -phase.cos();
        phase = (phase + LO_PHASE_INCREMENT).rem_euclid(TAU);
    }
}

impl OscillatorTable {
    /// Build the table with each channel starting at its own phase (radians).
    pub fn generate(start_phase_a: f64, start_phase_b: f64) -> Self {
        let mut table = Self {
            sin_a: [0.0; LO_TABLE_LEN],
            cos_a: [0.0; LO_TABLE_LEN],
            sin_b: [0.0; LO_TABLE_LEN],
            cos_b: [0.0; LO_TABLE_LEN],
        };
        fill(start_phase_a, &mut table.sin_a, &mut table.cos_a);
        fill(start_phase_b, &mut table.sin_b, &mut table.cos_b);
        table
    }
}

impl Default for OscillatorTable {
    fn default() -> Self {
        Self::generate(0.0, 0.0)
    }
}

/// Which half of the [`OscillatorTable`] a mixer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoChannel {
    A,
    B,
}

/// Real-to-complex mixer driven by the shared LO table.
///
/// The table index advances once per input sample and survives across
/// blocks, so consecutive blocks see a continuous LO.
#[derive(Debug, Clone)]
pub struct Mixer {
    channel: LoChannel,
    index: usize,
}

impl Mixer {
    pub fn new(channel: LoChannel) -> Self {
        Self { channel, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Mix `input` into `output`, replacing its contents.
    pub fn mix_into<I>(&mut self, table: &OscillatorTable, input: I, output: &mut Vec<Iq>)
    where
        I: IntoIterator<Item = i16>,
    {
        let (sin, cos) = match self.channel {
            LoChannel::A => (&table.sin_a, &table.cos_a),
            LoChannel::B => (&table.sin_b, &table.cos_b),
        };
        output.clear();
        for s in input {
            let s = s as f64;
            output.push(Iq::new(s * sin[self.index], s * cos[self.index]));
            self.index += 1;
            if self.index == LO_TABLE_LEN {
                self.index = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_periodic() {
        let table = OscillatorTable::generate(0.3, 1.1);
        // One more step past the end lands back on entry 0.
        let next = (0.3 + LO_PHASE_INCREMENT * LO_TABLE_LEN as f64).rem_euclid(TAU);
        assert!((next.sin() - table.sin_a[0]).abs() < 1e-9);
        assert!((-next.cos() - table.cos_a[0]).abs() < 1e-9);
    }

    #[test]
    fn test_table_values() {
        let table = OscillatorTable::generate(0.0, PI / 2.0);
        assert!(table.sin_a[0].abs() < 1e-12);
        assert!((table.cos_a[0] + 1.0).abs() < 1e-12);
        assert!((table.sin_b[0] - 1.0).abs() < 1e-12);
        assert!(table.cos_b[0].abs() < 1e-12);
        let expected = LO_PHASE_INCREMENT.sin();
        assert!((table.sin_a[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_mixer_index_persists_and_resets() {
        let table = OscillatorTable::default();
        let mut mixer = Mixer::new(LoChannel::A);
        let mut out = Vec::new();
        mixer.mix_into(&table, std::iter::repeat(1).take(25), &mut out);
        assert_eq!(mixer.index(), 25);
        mixer.mix_into(&table, std::iter::repeat(1).take(25), &mut out);
        assert_eq!(mixer.index(), 10);
        assert!((out[0].re - table.sin_a[25]).abs() < 1e-12);
        mixer.reset();
        assert_eq!(mixer.index(), 0);
    }

    #[test]
    fn test_mixer_zero_in_zero_out() {
        let table = OscillatorTable::generate(0.7, 0.2);
        let mut mixer = Mixer::new(LoChannel::B);
        let mut out = Vec::new();
        mixer.mix_into(&table, std::iter::repeat(0).take(100), &mut out);
        assert_eq!(out.len(), 100);
        assert!(out.iter().all(|z| z.re == 0.0 && z.im == 0.0));
    }
}
