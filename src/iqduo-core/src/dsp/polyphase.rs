// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Polyphase FIR decimator and interpolator with persistent state.

use crate::error::DspError;
use crate::Iq;

const ZERO: Iq = Iq::new(0.0, 0.0);

fn check_split(taps: usize, factor: usize) -> Result<(), DspError> {
    if factor == 0 {
        return Err(DspError::ZeroFactor);
    }
    if taps == 0 || taps % factor != 0 {
        return Err(DspError::CoefficientCount { taps, factor });
    }
    Ok(())
}

/// Push `sample` into a newest-first shift register.
#[inline]
fn shift_in(register: &mut [Iq], sample: Iq) {
    let len = register.len();
    register.copy_within(0..len - 1, 1);
    register[0] = sample;
}

#[inline]
fn dot(register: &[Iq], taps: &[f64]) -> Iq {
    register
        .iter()
        .zip(taps)
        .fold(ZERO, |acc, (&x, &h)| acc + x * h)
}

/// Decimate-by-M FIR split into M branches.
///
/// Branch `b` holds every M-th input starting at offset `b` inside each
/// group and filters it with `h[(M-1-b) + k*M]`. The branch partial sums
/// of one group add up to exactly the full-rate FIR output at the group's
/// last sample, which is the only output kept.
#[derive(Debug, Clone)]
pub struct PolyphaseDecimator {
    factor: usize,
    taps: usize,
    branch_coeffs: Vec<Vec<f64>>,
    registers: Vec<Vec<Iq>>,
    commutator: usize,
    acc: Iq,
}

impl PolyphaseDecimator {
    pub fn new(coeffs: &[f64], factor: usize) -> Result<Self, DspError> {
        check_split(coeffs.len(), factor)?;
        let per_branch = coeffs.len() / factor;
        let branch_coeffs = (0..factor)
            .map(|b| {
                (0..per_branch)
                    .map(|k| coeffs[(factor - 1 - b) + k * factor])
                    .collect()
            })
            .collect();
        Ok(Self {
            factor,
            taps: coeffs.len(),
            branch_coeffs,
            registers: vec![vec![ZERO; per_branch]; factor],
            commutator: 0,
            acc: ZERO,
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Filter and decimate `input`, replacing the contents of `output`.
    ///
    /// `input.len()` must be a multiple of the factor so the commutator is
    /// back on branch 0 when the call returns.
    pub fn process(&mut self, input: &[Iq], output: &mut Vec<Iq>) -> Result<(), DspError> {
        if input.len() % self.factor != 0 {
            return Err(DspError::BlockLength {
                len: input.len(),
                quantum: self.factor,
            });
        }
        output.clear();
        output.reserve(input.len() / self.factor);
        for &x in input {
            let b = self.commutator;
            let register = &mut self.registers[b];
            shift_in(register, x);
            self.acc += dot(register, &self.branch_coeffs[b]);
            self.commutator += 1;
            if self.commutator == self.factor {
                output.push(self.acc);
                self.acc = ZERO;
                self.commutator = 0;
            }
        }
        Ok(())
    }

    /// The last N inputs, oldest first, rebuilt from the branch registers.
    pub fn history(&self) -> Vec<Iq> {
        let m = self.factor;
        (0..self.taps)
            .rev()
            .map(|n| self.registers[m - 1 - n % m][n / m])
            .collect()
    }

    pub fn reset(&mut self) {
        self.registers.iter_mut().for_each(|r| r.fill(ZERO));
        self.commutator = 0;
        self.acc = ZERO;
    }
}

/// Interpolate-by-L FIR: L sub-filters share one register of N/L inputs.
#[derive(Debug, Clone)]
pub struct PolyphaseInterpolator {
    factor: usize,
    /// Sub-filter `p` is `L * h[p + k*L]`, gain folded in.
    phase_coeffs: Vec<Vec<f64>>,
    register: Vec<Iq>,
}

impl PolyphaseInterpolator {
    pub fn new(coeffs: &[f64], factor: usize) -> Result<Self, DspError> {
        check_split(coeffs.len(), factor)?;
        let per_phase = coeffs.len() / factor;
        let gain = factor as f64;
        let phase_coeffs = (0..factor)
            .map(|p| {
                (0..per_phase)
                    .map(|k| gain * coeffs[p + k * factor])
                    .collect()
            })
            .collect();
        Ok(Self {
            factor,
            phase_coeffs,
            register: vec![ZERO; per_phase],
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Emit `L` outputs per input, replacing the contents of `output`.
    pub fn process(&mut self, input: &[Iq], output: &mut Vec<Iq>) {
        output.clear();
        output.reserve(input.len() * self.factor);
        for &x in input {
            shift_in(&mut self.register, x);
            for taps in &self.phase_coeffs {
                output.push(dot(&self.register, taps));
            }
        }
    }

    pub fn reset(&mut self) {
        self.register.fill(ZERO);
    }
}
