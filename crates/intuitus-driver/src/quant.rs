//! Float8 output codec
//!
//! The accelerator writes every output element as one byte:
//!
//! ```text
//! bit  7..4  exponent e
//! bit  3..0  mantissa m        value = m * 2^(-e - 4)
//! ```
//!
//! Decoding is elementwise and infallible. Shapes are trusted: nothing here
//! checks that a byte slice really is the tensor the caller says it is,
//! beyond the length check of [`decode_feature_map`].

use crate::error::{IntuitusError, Result};

/// Decode one byte
#[must_use]
pub fn decode_byte(byte: u8) -> f32 {
    let mantissa = f32::from(byte & 0x0f);
    let exponent = i32::from(byte >> 4);
    // scale is 2^-4 ..= 2^-19, exact in f32
    mantissa * 2f32.powi(-exponent - 4)
}

/// Decode a byte slice
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().copied().map(decode_byte).collect()
}

/// Decode into a caller buffer; stops at the shorter of the two
pub fn decode_into(bytes: &[u8], out: &mut [f32]) {
    for (dst, src) in out.iter_mut().zip(bytes) {
        *dst = decode_byte(*src);
    }
}

/// Decoded feature map, channel-major
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    /// Channels
    pub channels: usize,
    /// Rows
    pub height: usize,
    /// Columns
    pub width: usize,
    /// `channels * height * width` values
    pub data: Vec<f32>,
}

impl FeatureMap {
    /// Value at `(channel, row, column)`
    #[must_use]
    pub fn get(&self, channel: usize, row: usize, column: usize) -> Option<f32> {
        if channel >= self.channels || row >= self.height || column >= self.width {
            return None;
        }
        self.data
            .get((channel * self.height + row) * self.width + column)
            .copied()
    }
}

/// Decode a `channels x height x width` output tensor
///
/// # Errors
///
/// Returns `DimensionMismatch` if `bytes` is not exactly that long.
pub fn decode_feature_map(bytes: &[u8], channels: usize, height: usize, width: usize) -> Result<FeatureMap> {
    let expected = channels
        .checked_mul(height)
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| IntuitusError::dimension_mismatch("feature map shape overflows"))?;
    if bytes.len() != expected {
        return Err(IntuitusError::dimension_mismatch(format!(
            "feature map {channels}x{height}x{width} needs {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(FeatureMap {
        channels,
        height,
        width,
        data: decode(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_patterns() {
        assert_eq!(decode_byte(0x00), 0.0);
        assert_eq!(decode_byte(0x0f), 0.9375);
        assert_eq!(decode_byte(0x01), 0.0625);
        assert_eq!(decode_byte(0x11), 2f32.powi(-5));
        assert_eq!(decode_byte(0x1f), 15.0 * 2f32.powi(-5));
        assert_eq!(decode_byte(0xf1), 2f32.powi(-19));
        // zero mantissa is zero at any exponent
        assert_eq!(decode_byte(0x70), 0.0);
    }

    #[test]
    fn decoding_is_elementwise() {
        let bytes = [0x0f, 0x23, 0x00, 0x91];
        let reversed: Vec<u8> = bytes.iter().rev().copied().collect();

        let mut forward = decode(&bytes);
        forward.reverse();
        assert_eq!(forward, decode(&reversed));
    }

    #[test]
    fn decode_into_stops_at_shorter() {
        let mut out = [-1.0f32; 3];
        decode_into(&[0x01, 0x02], &mut out);
        assert_eq!(out, [0.0625, 0.125, -1.0]);
    }

    #[test]
    fn feature_map_shape() {
        let bytes: Vec<u8> = (0..12).collect();
        let map = decode_feature_map(&bytes, 3, 2, 2).unwrap();
        assert_eq!(map.get(2, 1, 1), Some(decode_byte(11)));
        assert_eq!(map.get(3, 0, 0), None);

        assert!(decode_feature_map(&bytes, 3, 2, 3).is_err());
    }

    #[test]
    fn all_bytes_are_bounded() {
        for b in 0..=u8::MAX {
            let v = decode_byte(b);
            assert!((0.0..=0.9375).contains(&v), "{b:#04x} -> {v}");
        }
    }
}
