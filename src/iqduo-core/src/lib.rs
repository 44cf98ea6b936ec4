// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Block DSP core: IF mixing, polyphase rate conversion and shared
//! output rings for a two-channel 2 MHz real IF receiver.

pub mod admission;
pub mod config;
pub mod dsp;
pub mod error;
pub mod input;
pub mod output;
pub mod phase;
pub mod pipeline;
pub mod telemetry;

use std::time::Duration;

use num_complex::Complex;

/// One complex baseband sample.
pub type Iq = Complex<f64>;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Real IF sample rate delivered by the capture side (Hz).
pub const INPUT_SAMPLE_RATE: u32 = 2_000_000;
/// Samples per input block (40 ms at 2 MHz).
pub const BLOCK_SAMPLES: usize = 80_000;
/// Number of blocks in each capture pool.
pub const POOL_BLOCKS: usize = 10;
/// Wall-clock span covered by one block; also the per-job deadline.
pub const BLOCK_DURATION: Duration = Duration::from_millis(40);
/// Admission polling period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);
/// Output ring capacity: 500 ms at the highest output rate.
pub const OUTPUT_CAPACITY: usize = 96_000;

pub use admission::{Admission, AdmittedBlock, JobAdmission, JobState};
pub use config::{ChainConfig, ChannelMode, OutputRate};
pub use error::DspError;
pub use input::{CaptureWriter, InputPool};
pub use output::{OutputReader, OutputRing, Purpose};
pub use phase::{PhaseAnalyzer, PhaseReport};
pub use pipeline::{DspCommand, DspPipeline, JobReport};
pub use telemetry::{PerfSummary, PerformanceMonitor, ProcessTimes, StatusEvent};
