//! Actuator override datagram.
//!
//! One little-endian IEEE-754 `f32` per channel slot. NaN means the sender
//! has no opinion about that channel.

use crate::error::{Result, WireError};
use bytes::{Buf, BufMut};
use sitl_common::NUM_CHANNELS;

/// Size of an override datagram.
pub const OVERRIDE_PACKET_SIZE: usize = NUM_CHANNELS * 4;

/// Encode per-channel override values.
pub fn encode_overrides(values: &[f32; NUM_CHANNELS]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(OVERRIDE_PACKET_SIZE);
    for v in values {
        buf.put_f32_le(*v);
    }
    buf
}

/// Decode an override datagram.
pub fn decode_overrides(data: &[u8]) -> Result<[f32; NUM_CHANNELS]> {
    if data.len() != OVERRIDE_PACKET_SIZE {
        return Err(WireError::WrongLength {
            packet: "servo override",
            expected: OVERRIDE_PACKET_SIZE,
            actual: data.len(),
        });
    }
    let mut buf = data;
    let mut values = [0.0f32; NUM_CHANNELS];
    for v in values.iter_mut() {
        *v = buf.get_f32_le();
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_preserved() {
        let mut values = [f32::NAN; NUM_CHANNELS];
        values[3] = 1700.0;
        let decoded = decode_overrides(&encode_overrides(&values)).unwrap();
        assert_eq!(decoded[3], 1700.0);
        assert!(decoded[0].is_nan());
        assert!(decoded[31].is_nan());
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(decode_overrides(&[0u8; OVERRIDE_PACKET_SIZE - 4]).is_err());
        assert!(decode_overrides(&[0u8; OVERRIDE_PACKET_SIZE + 1]).is_err());
    }
}
