// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Low-pass prototypes for every stage of the resampling chain.
//!
//! Cutoffs are in cycles per sample at the rate the filter runs at: the
//! input rate for decimators, the output rate for interpolators.

use std::f64::consts::PI;

/// Prototype parameters for one polyphase stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageDesign {
    pub factor: usize,
    pub taps: usize,
    pub cutoff: f64,
}

/// First half-band: 2 MHz -> 1 MHz.
pub const D2A: StageDesign = StageDesign {
    factor: 2,
    taps: 32,
    cutoff: 0.2,
};
/// Second half-band, 96 kHz path only: 1 MHz -> 500 kHz.
pub const D2B: StageDesign = StageDesign {
    factor: 2,
    taps: 32,
    cutoff: 0.2,
};
/// 500 kHz -> 100 kHz (96 kHz path) or 1 MHz -> 200 kHz (192 kHz path).
pub const D5: StageDesign = StageDesign {
    factor: 5,
    taps: 150,
    cutoff: 0.09,
};
/// Up by 6 ahead of the first stride-5 step.
pub const I6: StageDesign = StageDesign {
    factor: 6,
    taps: 180,
    cutoff: 0.08,
};
/// Up by 4 ahead of the second stride-5 step.
pub const I4: StageDesign = StageDesign {
    factor: 4,
    taps: 96,
    cutoff: 0.09,
};

/// Blackman-windowed sinc. Unnormalized.
fn windowed_sinc(cutoff: f64, taps: usize) -> Vec<f64> {
    if taps == 0 {
        return Vec::new();
    }
    if taps == 1 {
        return vec![1.0];
    }
    let m = (taps - 1) as f64;
    (0..taps)
        .map(|i| {
            let x = i as f64 - m / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let t = 2.0 * PI * i as f64 / m;
            let window = 0.42 - 0.5 * t.cos() + 0.08 * (2.0 * t).cos();
            sinc * window
        })
        .collect()
}

/// Low-pass prototype with unity DC gain.
pub fn decimator_coeffs(design: StageDesign) -> Vec<f64> {
    let mut coeffs = windowed_sinc(design.cutoff, design.taps);
    let sum: f64 = coeffs.iter().sum();
    if sum.abs() > 1e-12 {
        let inv = 1.0 / sum;
        coeffs.iter_mut().for_each(|c| *c *= inv);
    }
    coeffs
}

/// Low-pass prototype whose every polyphase branch sums to `1 / L`.
///
/// With the interpolator's `L` gain this gives exactly unity DC gain on
/// every output phase, so a constant input produces a constant output.
pub fn interpolator_coeffs(design: StageDesign) -> Vec<f64> {
    let l = design.factor.max(1);
    let mut coeffs = windowed_sinc(design.cutoff, design.taps);
    for phase in 0..l {
        let sum: f64 = coeffs.iter().skip(phase).step_by(l).sum();
        if sum.abs() > 1e-12 {
            let scale = 1.0 / (sum * l as f64);
            coeffs
                .iter_mut()
                .skip(phase)
                .step_by(l)
                .for_each(|c| *c *= scale);
        }
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_counts_split_evenly() {
        for design in [D2A, D2B, D5, I6, I4] {
            assert_eq!(design.taps % design.factor, 0, "{design:?}");
        }
    }

    #[test]
    fn test_decimator_unity_dc() {
        let h = decimator_coeffs(D5);
        assert_eq!(h.len(), 150);
        let sum: f64 = h.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_prototype_is_symmetric() {
        let h = decimator_coeffs(D2A);
        for i in 0..h.len() / 2 {
            assert!((h[i] - h[h.len() - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_interpolator_phases_sum_to_inverse_factor() {
        let h = interpolator_coeffs(I6);
        for phase in 0..6 {
            let sum: f64 = h.iter().skip(phase).step_by(6).sum();
            assert!((sum - 1.0 / 6.0).abs() < 1e-12, "phase {phase}: {sum}");
        }
    }

    #[test]
    fn test_stopband_attenuation() {
        // 0.4 cycles/sample folds onto 0.1 after decimation by two.
        let h = decimator_coeffs(D2A);
        let f = 0.4;
        let (mut re, mut im) = (0.0, 0.0);
        for (n, c) in h.iter().enumerate() {
            let w = 2.0 * PI * f * n as f64;
            re += c * w.cos();
            im -= c * w.sin();
        }
        let mag = (re * re + im * im).sqrt();
        assert!(mag < 0.01, "stopband magnitude {mag}");
    }
}
