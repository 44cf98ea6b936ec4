// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Linrad / MAP65 network framing.
//!
//! Every datagram is a 24-byte little-endian header followed by a 1392-byte
//! payload. TIMF2 carries f32 I/Q (one or two channels), RAW16 carries
//! 16-bit I/Q for both channels.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use iqduo_core::Iq;

use crate::pcm;
use crate::ProtocolError;

pub const HEADER_LEN: usize = 24;
pub const PAYLOAD_LEN: usize = 1392;
pub const DATAGRAM_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// UDP port Linrad listens on for TIMF2 float data.
pub const TIMF2_PORT: u16 = 50004;
/// UDP port for RAW16 data.
pub const RAW16_PORT: u16 = 50000;
/// TCP port answering Linrad control requests in RAW16 mode.
pub const CONTROL_PORT: u16 = 49812;

/// Linrad buffer size announced in the mode response (bytes).
pub const LINRAD_BLOCK_SIZE: i32 = 4096;

const TIMF2_PTR_STEP: i32 = 360;
const TIMF2_PTR_WRAP: i32 = 1016;

pub const MODE_REQUEST: u8 = 0xb8;
pub const CAL_REQUEST_1: u8 = 0xb5;
pub const CAL_REQUEST_2: u8 = 0xb6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetRxHeader {
    /// Passband centre in MHz.
    pub passband_center: f64,
    /// Sender clock in milliseconds.
    pub time: i32,
    pub userx_freq: f32,
    pub ptr: i32,
    pub block_no: u16,
    /// -1 single-channel float, -2 dual-channel float, 0xff (-1) RAW16.
    pub userx_no: i8,
    pub passband_direction: i8,
}

impl NetRxHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_f64_le(self.passband_center);
        buf.put_i32_le(self.time);
        buf.put_f32_le(self.userx_freq);
        buf.put_i32_le(self.ptr);
        buf.put_u16_le(self.block_no);
        buf.put_i8(self.userx_no);
        buf.put_i8(self.passband_direction);
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN,
                got: data.len(),
            });
        }
        Ok(Self {
            passband_center: data.get_f64_le(),
            time: data.get_i32_le(),
            userx_freq: data.get_f32_le(),
            ptr: data.get_i32_le(),
            block_no: data.get_u16_le(),
            userx_no: data.get_i8(),
            passband_direction: data.get_i8(),
        })
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), ProtocolError> {
    if expected != got {
        return Err(ProtocolError::SampleCount { expected, got });
    }
    Ok(())
}

/// Builds consecutive TIMF2 float datagrams.
#[derive(Debug, Clone)]
pub struct Timf2Packetizer {
    dual: bool,
    passband_center: f64,
    userx_freq: f32,
    ptr: i32,
    block_no: u16,
}

impl Timf2Packetizer {
    pub fn new(dual: bool, centre_khz: f64, sample_rate: u32) -> Self {
        Self {
            dual,
            passband_center: centre_khz / 1000.0,
            userx_freq: sample_rate as f32,
            ptr: 0,
            block_no: 0,
        }
    }

    /// Complex samples per channel in one datagram: 174 single, 87 dual.
    pub fn samples_per_packet(&self) -> usize {
        if self.dual {
            PAYLOAD_LEN / 16
        } else {
            PAYLOAD_LEN / 8
        }
    }

    /// Frame one datagram. `b` is required in dual mode and ignored otherwise.
    pub fn packet(&mut self, a: &[Iq], b: &[Iq], time: i32) -> Result<Bytes, ProtocolError> {
        let n = self.samples_per_packet();
        check_len(n, a.len())?;
        if self.dual {
            check_len(n, b.len())?;
        }

        let header = NetRxHeader {
            passband_center: self.passband_center,
            time,
            userx_freq: self.userx_freq,
            ptr: self.ptr,
            block_no: self.block_no,
            userx_no: if self.dual { -2 } else { -1 },
            passband_direction: -1,
        };
        self.block_no = self.block_no.wrapping_add(1);
        self.ptr += TIMF2_PTR_STEP;
        if self.ptr >= TIMF2_PTR_WRAP {
            self.ptr -= TIMF2_PTR_WRAP;
        }

        let mut buf = BytesMut::with_capacity(DATAGRAM_LEN);
        header.encode(&mut buf);
        for k in 0..n {
            buf.put_f32_le(a[k].re as f32);
            buf.put_f32_le(a[k].im as f32);
            if self.dual {
                buf.put_f32_le(b[k].re as f32);
                buf.put_f32_le(b[k].im as f32);
            }
        }
        Ok(buf.freeze())
    }
}

/// Builds consecutive RAW16 datagrams from soundcard-format samples.
#[derive(Debug, Clone, Default)]
pub struct Raw16Packetizer {
    ptr: i32,
    block_no: u16,
}

impl Raw16Packetizer {
    pub const SAMPLES_PER_PACKET: usize = PAYLOAD_LEN / 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet(&mut self, a: &[Iq], b: &[Iq], time: i32) -> Result<Bytes, ProtocolError> {
        check_len(Self::SAMPLES_PER_PACKET, a.len())?;
        check_len(Self::SAMPLES_PER_PACKET, b.len())?;

        self.ptr += PAYLOAD_LEN as i32;
        if self.ptr >= LINRAD_BLOCK_SIZE {
            self.ptr -= LINRAD_BLOCK_SIZE;
        }
        let header = NetRxHeader {
            passband_center: 0.048,
            time,
            userx_freq: 96_000.0,
            ptr: self.ptr,
            block_no: self.block_no,
            userx_no: -1,
            passband_direction: 1,
        };
        self.block_no = self.block_no.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(DATAGRAM_LEN);
        header.encode(&mut buf);
        pcm::encode_quad(a, b, &mut buf);
        Ok(buf.freeze())
    }
}

/// Answer to a Linrad receive-mode request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeResponse {
    pub sample_rate: i32,
    pub real_channels: i32,
    pub rf_channels: i32,
    pub rx_input_mode: i32,
    pub block_bytes: i32,
    pub fft1_size: i32,
    pub fft1_n: i32,
    pub first_fft_sinpow: i32,
}

impl ModeResponse {
    pub fn raw16(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as i32,
            real_channels: 4,
            rf_channels: 2,
            rx_input_mode: 6,
            block_bytes: LINRAD_BLOCK_SIZE,
            fft1_size: 0x800,
            fft1_n: 0x0b,
            first_fft_sinpow: 2,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        for v in [
            self.sample_rate,
            self.real_channels,
            self.rf_channels,
            self.rx_input_mode,
            self.block_bytes,
            self.fft1_size,
            self.fft1_n,
            self.first_fft_sinpow,
        ] {
            buf.put_i32_le(v);
        }
        buf.freeze()
    }
}

/// Reply to a control message from Linrad, keyed on its first byte.
pub fn control_response(request: &[u8], sample_rate: u32) -> Option<Bytes> {
    match *request.first()? {
        MODE_REQUEST => Some(ModeResponse::raw16(sample_rate).encode()),
        CAL_REQUEST_1 | CAL_REQUEST_2 => Some(Bytes::from_static(&[0x00])),
        _ => None,
    }
}
