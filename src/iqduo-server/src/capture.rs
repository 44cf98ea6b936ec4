// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Synthetic two-channel IF source.
//!
//! Stands in for the capture hardware: writes a real test tone near the
//! 450 kHz LO into both input pools at the 2 MHz sample rate, one block
//! every 40 ms.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use rand::Rng;
use tracing::{error, info};

use iqduo_core::dsp::LO_PHASE_INCREMENT;
use iqduo_core::{CaptureWriter, InputPool, BLOCK_DURATION, BLOCK_SAMPLES, INPUT_SAMPLE_RATE};

use crate::config::CaptureConfig;

/// Continuous-phase real tone generator.
pub struct ToneSource {
    step: f64,
    phase: f64,
    offset: f64,
    amplitude: f64,
    noise: f64,
}

impl ToneSource {
    /// `offset` is added to the running phase of every sample.
    pub fn new(cfg: &CaptureConfig, offset: f64) -> Self {
        let lo_hz = LO_PHASE_INCREMENT / TAU * f64::from(INPUT_SAMPLE_RATE);
        Self {
            step: TAU * (lo_hz + cfg.tone_offset_hz) / f64::from(INPUT_SAMPLE_RATE),
            phase: 0.0,
            offset,
            amplitude: cfg.amplitude,
            noise: cfg.noise,
        }
    }

    pub fn fill<R: Rng>(&mut self, rng: &mut R, out: &mut [i16]) {
        for sample in out.iter_mut() {
            let mut x = self.amplitude * (self.phase + self.offset).cos();
            if self.noise > 0.0 {
                x += rng.gen_range(-self.noise..=self.noise);
            }
            *sample = x.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
            self.phase = (self.phase + self.step) % TAU;
        }
    }
}

/// Spawn the generator thread. It runs until `stop` is set.
pub fn spawn_capture(
    cfg: &CaptureConfig,
    pool_a: Arc<InputPool>,
    pool_b: Arc<InputPool>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let mut tone_a = ToneSource::new(cfg, 0.0);
    let mut tone_b = ToneSource::new(cfg, cfg.b_phase_deg.to_radians());
    let offset_hz = cfg.tone_offset_hz;

    std::thread::Builder::new()
        .name("iqduo-capture".to_string())
        .spawn(move || {
            let mut writer_a = CaptureWriter::new(pool_a);
            let mut writer_b = CaptureWriter::new(pool_b);
            let mut rng = rand::thread_rng();
            let mut chunk_a = vec![0i16; BLOCK_SAMPLES];
            let mut chunk_b = vec![0i16; BLOCK_SAMPLES];
            info!("synthetic capture started (tone LO{:+.0} Hz)", offset_hz);

            let mut next = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                tone_a.fill(&mut rng, &mut chunk_a);
                tone_b.fill(&mut rng, &mut chunk_b);
                let done_a = writer_a.push(&chunk_a);
                let done_b = writer_b.push(&chunk_b);
                if done_a != done_b {
                    error!("capture pools out of step: A {} B {}", done_a, done_b);
                }

                next += BLOCK_DURATION;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
            info!("synthetic capture stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tone_amplitude_and_phase() {
        let cfg = CaptureConfig {
            amplitude: 1000.0,
            ..CaptureConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = ToneSource::new(&cfg, 0.0);
        let mut b = ToneSource::new(&cfg, std::f64::consts::PI);
        let mut out_a = vec![0i16; 4096];
        let mut out_b = vec![0i16; 4096];
        a.fill(&mut rng, &mut out_a);
        b.fill(&mut rng, &mut out_b);

        assert_eq!(out_a[0], 1000);
        assert_eq!(out_b[0], -1000);
        assert!(out_a.iter().all(|s| s.abs() <= 1000));
        // Inverted copy of A.
        assert!(out_a.iter().zip(&out_b).all(|(x, y)| (x + y).abs() <= 1));
    }

    #[test]
    fn test_tone_clamps() {
        let cfg = CaptureConfig {
            amplitude: 30_000.0,
            noise: 10_000.0,
            ..CaptureConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mut tone = ToneSource::new(&cfg, 0.0);
        let mut out = vec![0i16; 2048];
        tone.fill(&mut rng, &mut out);
        assert!(out.iter().any(|&s| s == i16::MAX || s == i16::MIN));
    }

    #[test]
    fn test_phase_continues_across_chunks() {
        let cfg = CaptureConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut whole = ToneSource::new(&cfg, 0.0);
        let mut split = ToneSource::new(&cfg, 0.0);
        let mut one = vec![0i16; 1000];
        let mut two = vec![0i16; 1000];
        whole.fill(&mut rng, &mut one);
        split.fill(&mut rng, &mut two[..400]);
        split.fill(&mut rng, &mut two[400..]);
        assert_eq!(one, two);
    }
}
