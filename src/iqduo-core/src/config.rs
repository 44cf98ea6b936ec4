// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run-time parameters of the resampling chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::INPUT_SAMPLE_RATE;

/// Supported complex output rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum OutputRate {
    #[default]
    Hz96000,
    Hz192000,
}

impl OutputRate {
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz96000 => 96_000,
            Self::Hz192000 => 192_000,
        }
    }

    /// Complex samples produced for `input_len` real input samples.
    pub fn output_len(self, input_len: usize) -> usize {
        (input_len as u64 * self.hz() as u64 / INPUT_SAMPLE_RATE as u64) as usize
    }
}

impl TryFrom<u32> for OutputRate {
    type Error = DspError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        match hz {
            96_000 => Ok(Self::Hz96000),
            192_000 => Ok(Self::Hz192000),
            other => Err(DspError::UnsupportedRate(other)),
        }
    }
}

impl From<OutputRate> for u32 {
    fn from(rate: OutputRate) -> Self {
        rate.hz()
    }
}

impl fmt::Display for OutputRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Which receiver channels are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Off,
    #[default]
    A,
    Ab,
}

impl ChannelMode {
    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }

    pub fn is_dual(self) -> bool {
        self == Self::Ab
    }
}

impl FromStr for ChannelMode {
    type Err = DspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "a" => Ok(Self::A),
            "ab" | "dual" => Ok(Self::Ab),
            other => Err(DspError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::A => write!(f, "a"),
            Self::Ab => write!(f, "ab"),
        }
    }
}

/// Chain parameters. Only swapped while the pipeline is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub sample_rate: OutputRate,
    pub mode: ChannelMode,
    /// Write channel A into the channel B network buffer.
    pub duplicate_a: bool,
    /// Mirror the network-format passband about fs/2.
    pub reposition: bool,
    /// Fill the network-format buffers.
    pub network_output: bool,
    /// Fill the soundcard-format buffers.
    pub soundcard_output: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sample_rate: OutputRate::Hz96000,
            mode: ChannelMode::A,
            duplicate_a: false,
            reposition: false,
            network_output: true,
            soundcard_output: false,
        }
    }
}
