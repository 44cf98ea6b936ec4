// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Numeric building blocks: LO table and mixer, polyphase rate converters,
//! the per-channel resampling chain and spectral repositioning.

pub mod chain;
pub mod coeffs;
pub mod oscillator;
pub mod polyphase;
pub mod reposition;

pub use chain::ResamplingChain;
pub use oscillator::{LoChannel, Mixer, OscillatorTable, LO_PHASE_INCREMENT, LO_TABLE_LEN};
pub use polyphase::{PolyphaseDecimator, PolyphaseInterpolator};
pub use reposition::Repositioner;
