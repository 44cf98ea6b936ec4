// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::debug;

use super::coeffs::{self, D2A, D2B, D5, I4, I6};
use super::oscillator::{LoChannel, Mixer, OscillatorTable};
use super::polyphase::{PolyphaseDecimator, PolyphaseInterpolator};
use crate::config::OutputRate;
use crate::error::DspError;
use crate::Iq;

/// Plain subsampling factor applied after each interpolator.
pub const STRIDE: usize = 5;

/// Keep every `stride`-th sample. A trailing partial group is dropped.
fn stride_into(input: &[Iq], stride: usize, output: &mut Vec<Iq>) {
    let whole = input.len() / stride * stride;
    output.clear();
    output.extend(input[..whole].iter().step_by(stride).copied());
}

/// Mixer plus the rational resampler for one receiver channel.
///
/// 96 kHz: 2 MHz -> D2 -> D2 -> D5 -> I6 -> /5 -> I4 -> /5
/// 192 kHz: 2 MHz -> D2 -> D5 -> I6 -> /5 -> I4 -> /5
pub struct ResamplingChain {
    rate: OutputRate,
    mixer: Mixer,
    d2a: PolyphaseDecimator,
    d2b: Option<PolyphaseDecimator>,
    d5: PolyphaseDecimator,
    i6: PolyphaseInterpolator,
    i4: PolyphaseInterpolator,
    ping: Vec<Iq>,
    pong: Vec<Iq>,
}

impl ResamplingChain {
    pub fn new(rate: OutputRate, channel: LoChannel) -> Result<Self, DspError> {
        let d2b = match rate {
            OutputRate::Hz96000 => Some(PolyphaseDecimator::new(
                &coeffs::decimator_coeffs(D2B),
                D2B.factor,
            )?),
            OutputRate::Hz192000 => None,
        };
        debug!(
            "building {:?} chain for {} ({} stages)",
            channel,
            rate,
            if d2b.is_some() { 5 } else { 4 }
        );
        Ok(Self {
            rate,
            mixer: Mixer::new(channel),
            d2a: PolyphaseDecimator::new(&coeffs::decimator_coeffs(D2A), D2A.factor)?,
            d2b,
            d5: PolyphaseDecimator::new(&coeffs::decimator_coeffs(D5), D5.factor)?,
            i6: PolyphaseInterpolator::new(&coeffs::interpolator_coeffs(I6), I6.factor)?,
            i4: PolyphaseInterpolator::new(&coeffs::interpolator_coeffs(I4), I4.factor)?,
            ping: Vec::new(),
            pong: Vec::new(),
        })
    }

    pub fn rate(&self) -> OutputRate {
        self.rate
    }

    /// Smallest input length every stage divides exactly.
    pub fn quantum(rate: OutputRate) -> usize {
        match rate {
            OutputRate::Hz96000 => 500,
            OutputRate::Hz192000 => 250,
        }
    }

    /// Restart the LO walk at table entry 0. Filter state is kept.
    pub fn reset_mixer(&mut self) {
        self.mixer.reset();
    }

    /// Convert one block of real IF samples into `output` (replaced).
    pub fn process(
        &mut self,
        table: &OscillatorTable,
        input: &[i16],
        output: &mut Vec<Iq>,
    ) -> Result<(), DspError> {
        let quantum = Self::quantum(self.rate);
        if input.len() % quantum != 0 {
            return Err(DspError::BlockLength {
                len: input.len(),
                quantum,
            });
        }

        self.mixer
            .mix_into(table, input.iter().copied(), &mut self.ping);
        self.d2a.process(&self.ping, &mut self.pong)?;
        if let Some(d2b) = self.d2b.as_mut() {
            d2b.process(&self.pong, &mut self.ping)?;
            std::mem::swap(&mut self.ping, &mut self.pong);
        }
        self.d5.process(&self.pong, &mut self.ping)?;
        self.i6.process(&self.ping, &mut self.pong);
        stride_into(&self.pong, STRIDE, &mut self.ping);
        self.i4.process(&self.ping, &mut self.pong);
        stride_into(&self.pong, STRIDE, output);
        Ok(())
    }
}
