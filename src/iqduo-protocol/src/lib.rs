// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire formats for exporting baseband: Linrad network datagrams and
//! interleaved 16-bit PCM.

pub mod linrad;
pub mod pcm;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("datagram truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("packet needs exactly {expected} samples per channel, got {got}")]
    SampleCount { expected: usize, got: usize },
}

pub use linrad::{NetRxHeader, Raw16Packetizer, Timf2Packetizer};
pub use pcm::PcmLayout;
