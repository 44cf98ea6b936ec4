// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Interleaved signed 16-bit little-endian PCM.

use bytes::{BufMut, BytesMut};

use iqduo_core::Iq;

/// Channel arrangement of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmLayout {
    /// I, Q of one receiver channel.
    Stereo,
    /// IA, QA, IB, QB.
    Quad,
}

impl PcmLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Stereo => 2,
            Self::Quad => 4,
        }
    }

    pub fn bytes_per_frame(self) -> usize {
        self.channels() * 2
    }
}

/// Truncating conversion; out-of-range values clamp to the i16 limits.
#[inline]
pub fn to_i16(x: f64) -> i16 {
    x as i16
}

pub fn encode_stereo(iq: &[Iq], buf: &mut BytesMut) {
    buf.reserve(iq.len() * PcmLayout::Stereo.bytes_per_frame());
    for z in iq {
        buf.put_i16_le(to_i16(z.re));
        buf.put_i16_le(to_i16(z.im));
    }
}

/// Interleave two channels. Frames stop at the shorter input.
pub fn encode_quad(a: &[Iq], b: &[Iq], buf: &mut BytesMut) {
    buf.reserve(a.len().min(b.len()) * PcmLayout::Quad.bytes_per_frame());
    for (za, zb) in a.iter().zip(b) {
        buf.put_i16_le(to_i16(za.re));
        buf.put_i16_le(to_i16(za.im));
        buf.put_i16_le(to_i16(zb.re));
        buf.put_i16_le(to_i16(zb.im));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn test_to_i16_saturates() {
        assert_eq!(to_i16(1234.9), 1234);
        assert_eq!(to_i16(-1234.9), -1234);
        assert_eq!(to_i16(1e9), i16::MAX);
        assert_eq!(to_i16(-1e9), i16::MIN);
        assert_eq!(to_i16(f64::NAN), 0);
    }

    #[test]
    fn test_stereo_layout() {
        let mut buf = BytesMut::new();
        encode_stereo(&[Iq::new(1.0, -2.0), Iq::new(300.0, 40_000.0)], &mut buf);
        assert_eq!(buf.len(), 8);
        let mut data = &buf[..];
        assert_eq!(data.get_i16_le(), 1);
        assert_eq!(data.get_i16_le(), -2);
        assert_eq!(data.get_i16_le(), 300);
        assert_eq!(data.get_i16_le(), i16::MAX);
    }

    #[test]
    fn test_quad_layout() {
        let a = [Iq::new(1.0, 2.0), Iq::new(5.0, 6.0)];
        let b = [Iq::new(3.0, 4.0)];
        let mut buf = BytesMut::new();
        encode_quad(&a, &b, &mut buf);
        assert_eq!(buf.len(), PcmLayout::Quad.bytes_per_frame());
        assert_eq!(&buf[..], &[1, 0, 2, 0, 3, 0, 4, 0]);
    }
}
