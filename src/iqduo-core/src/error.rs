// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Construction and framing errors raised by the DSP core.
///
/// None of these can occur mid-job once a pipeline has been built: the
/// numeric path itself has no failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DspError {
    #[error("rate change factor must be >= 1")]
    ZeroFactor,

    #[error("{taps} coefficients cannot be split into {factor} polyphase branches")]
    CoefficientCount { taps: usize, factor: usize },

    #[error("block of {len} samples is not a multiple of {quantum}")]
    BlockLength { len: usize, quantum: usize },

    #[error("unsupported output sample rate {0} Hz (expected 96000 or 192000)")]
    UnsupportedRate(u32),

    #[error("unknown channel mode '{0}' (expected off, a or ab)")]
    UnknownMode(String),
}
