// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! A/B phase measurement used to align the two receiver channels.

use std::f64::consts::{PI, TAU};

use tracing::info;

use crate::output::{OutputRing, Purpose};
use crate::Iq;

/// Samples examined per measurement.
pub const PHASE_WINDOW: usize = 256;
/// Auto-calibration engages when the spread is below this (5 degrees).
pub const LOCK_SPREAD: f64 = PI / 36.0;

/// One A/B phase measurement. Angles are radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReport {
    /// Circular mean of `arg(A) - arg(B)`, in `[0, 2π)`.
    pub mean: f64,
    /// Smallest and largest difference, relative to the mean.
    pub min: f64,
    pub max: f64,
    /// Amount to add to channel B's LO phase so the measured difference
    /// becomes the required one.
    pub correction: f64,
    /// Largest `|I|` over both channels.
    pub peak: f64,
}

impl PhaseReport {
    pub fn spread(&self) -> f64 {
        self.max - self.min
    }
}

/// Wrap into `(-π, π]`.
fn wrap_pi(x: f64) -> f64 {
    let y = x.rem_euclid(TAU);
    if y > PI {
        y - TAU
    } else {
        y
    }
}

/// Measure `a` against `b` sample by sample. `None` for empty input.
///
/// `mirrored` is set when the samples went through spectral
/// repositioning, which negates every phase difference.
pub fn measure(a: &[Iq], b: &[Iq], required: f64, mirrored: bool) -> Option<PhaseReport> {
    let n = a.len().min(b.len());
    if n == 0 {
        return None;
    }
    let diffs: Vec<f64> = a
        .iter()
        .zip(b)
        .map(|(za, zb)| (za.arg() - zb.arg()).rem_euclid(TAU))
        .collect();
    let (s, c) = diffs
        .iter()
        .fold((0.0f64, 0.0f64), |(s, c), d| (s + d.sin(), c + d.cos()));
    let mean = s.atan2(c).rem_euclid(TAU);

    let (min, max) = diffs.iter().fold((f64::MAX, f64::MIN), |(lo, hi), d| {
        let dev = wrap_pi(d - mean);
        (lo.min(dev), hi.max(dev))
    });
    let peak = a
        .iter()
        .zip(b)
        .fold(0.0f64, |g, (za, zb)| g.max(za.re.abs()).max(zb.re.abs()));

    Some(PhaseReport {
        mean,
        min,
        max,
        correction: if mirrored {
            (required - mean).rem_euclid(TAU)
        } else {
            (mean - required).rem_euclid(TAU)
        },
        peak,
    })
}

/// Periodic phase measurement with optional one-shot auto-calibration.
#[derive(Debug, Clone)]
pub struct PhaseAnalyzer {
    required: f64,
    auto_cal: bool,
    locked: bool,
    window: usize,
}

impl PhaseAnalyzer {
    /// `required_deg` is the desired A - B phase after correction.
    pub fn new(required_deg: f64, auto_cal: bool) -> Self {
        Self {
            required: required_deg.to_radians(),
            auto_cal,
            locked: false,
            window: PHASE_WINDOW,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Allow auto-calibration to fire again.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Measure the newest network-format samples.
    pub fn analyze(&self, ring: &OutputRing, mirrored: bool) -> Option<PhaseReport> {
        let a = ring.latest(Purpose::NetworkA, self.window);
        let b = ring.latest(Purpose::NetworkB, self.window);
        measure(&a, &b, self.required, mirrored)
    }

    /// Returns the correction to apply when auto-calibration locks.
    ///
    /// Fires at most once until [`PhaseAnalyzer::unlock`].
    pub fn auto_correction(&mut self, report: &PhaseReport) -> Option<f64> {
        if !self.auto_cal || self.locked {
            return None;
        }
        let spread = report.spread();
        if spread > 0.0 && spread < LOCK_SPREAD {
            self.locked = true;
            info!(
                "phase locked: mean {:.1} deg, spread {:.2} deg, correction {:.1} deg",
                report.mean.to_degrees(),
                spread.to_degrees(),
                report.correction.to_degrees()
            );
            return Some(report.correction);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize, offset: f64, jitter: f64) -> Vec<Iq> {
        (0..n)
            .map(|k| {
                let wobble = if k % 2 == 0 { jitter } else { -jitter };
                Iq::from_polar(1000.0, 0.05 * k as f64 + offset + wobble)
            })
            .collect()
    }

    #[test]
    fn test_measures_constant_offset() {
        let a = tone(128, 0.7, 0.0);
        let b = tone(128, 0.2, 0.0);
        let report = measure(&a, &b, 0.0, false).unwrap();
        assert!((report.mean - 0.5).abs() < 1e-9, "{}", report.mean);
        assert!(report.spread() < 1e-9);
        assert!((report.correction - 0.5).abs() < 1e-9);
        assert!((report.peak - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_mirrored_correction_flips() {
        let a = tone(128, 0.7, 0.0);
        let b = tone(128, 0.2, 0.0);
        let report = measure(&a, &b, 0.0, true).unwrap();
        assert!((report.correction - (TAU - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_mean_is_circular_near_zero() {
        // Differences straddle 0/2π; an arithmetic mean would land near π.
        let a = tone(64, 0.0, 0.01);
        let b = tone(64, 0.0, 0.0);
        let report = measure(&a, &b, 0.0, false).unwrap();
        assert!(wrap_pi(report.mean).abs() < 1e-6, "{}", report.mean);
        assert!((report.spread() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_required_phase_in_correction() {
        let a = tone(32, 1.0, 0.0);
        let b = tone(32, 1.0, 0.0);
        let direct = measure(&a, &b, PI / 2.0, false).unwrap();
        assert!((direct.correction - 1.5 * PI).abs() < 1e-9);
        let mirrored = measure(&a, &b, PI / 2.0, true).unwrap();
        assert!((mirrored.correction - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(measure(&[], &[], 0.0, false).is_none());
    }

    #[test]
    fn test_auto_cal_locks_once() {
        let mut analyzer = PhaseAnalyzer::new(0.0, true);
        let a = tone(64, 0.3, 0.01);
        let b = tone(64, 0.0, 0.0);
        let report = measure(&a, &b, 0.0, false).unwrap();
        let correction = analyzer.auto_correction(&report).unwrap();
        assert!((correction - 0.3).abs() < 1e-6);
        assert!(analyzer.is_locked());
        assert!(analyzer.auto_correction(&report).is_none());
        analyzer.unlock();
        assert!(analyzer.auto_correction(&report).is_some());
    }

    #[test]
    fn test_auto_cal_needs_tight_spread() {
        let mut analyzer = PhaseAnalyzer::new(0.0, true);
        let a = tone(64, 0.3, 0.1);
        let b = tone(64, 0.0, 0.0);
        let report = measure(&a, &b, 0.0, false).unwrap();
        assert!(analyzer.auto_correction(&report).is_none());
        // A perfectly flat difference does not lock either.
        let flat = measure(&b, &b, 0.0, false).unwrap();
        assert!(analyzer.auto_correction(&flat).is_none());
    }

    #[test]
    fn test_analyze_reads_network_rings() {
        let ring = OutputRing::with_capacity(1024);
        let a = tone(PHASE_WINDOW, 1.2, 0.0);
        let b = tone(PHASE_WINDOW, 0.2, 0.0);
        ring.publish(
            PHASE_WINDOW,
            &[(Purpose::NetworkA, &a[..]), (Purpose::NetworkB, &b[..])],
        );
        let report = PhaseAnalyzer::new(0.0, false)
            .analyze(&ring, false)
            .unwrap();
        assert!((report.mean - 1.0).abs() < 1e-9);
    }
}
