//! State datagram.
//!
//! Published once per physics step to the multicast state group. All fields
//! are little-endian.
//!
//! ```text
//! offset  size  field
//!      0     4  magic (0x4C544953, "SITL")
//!      4     8  timestamp_us (u64)
//!     12     8  latitude (f64, deg)
//!     20     8  longitude (f64, deg)
//!     28     8  altitude (f64, m)
//!     36     8  roll (f64, deg)
//!     44     8  pitch (f64, deg)
//!     52     8  yaw (f64, deg)
//!     60     8  airspeed (f64, m/s)
//!     68    12  velocity_air_bf (3 x f32, m/s)
//!     80     4  height_agl (f32, m)
//!     84     4  motor_mask (u32)
//! ```

use crate::error::{Result, WireError};
use bytes::{Buf, BufMut};
use sitl_common::{ChannelMask, SimulatedState};

/// Magic number at the start of every state datagram.
pub const STATE_MAGIC: u32 = u32::from_le_bytes(*b"SITL");

/// Size of an encoded state datagram.
pub const STATE_PACKET_SIZE: usize = 88;

/// Encode a state into a datagram.
pub fn encode_state(state: &SimulatedState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(STATE_PACKET_SIZE);
    buf.put_u32_le(STATE_MAGIC);
    buf.put_u64_le(state.timestamp_us);
    buf.put_f64_le(state.latitude);
    buf.put_f64_le(state.longitude);
    buf.put_f64_le(state.altitude);
    buf.put_f64_le(state.roll_deg);
    buf.put_f64_le(state.pitch_deg);
    buf.put_f64_le(state.yaw_deg);
    buf.put_f64_le(state.airspeed);
    for v in state.velocity_air_bf {
        buf.put_f32_le(v);
    }
    buf.put_f32_le(state.height_agl);
    buf.put_u32_le(state.motor_mask.bits());
    buf
}

/// Decode a state datagram.
pub fn decode_state(data: &[u8]) -> Result<SimulatedState> {
    if data.len() != STATE_PACKET_SIZE {
        return Err(WireError::WrongLength {
            packet: "state",
            expected: STATE_PACKET_SIZE,
            actual: data.len(),
        });
    }

    let mut buf = data;
    let magic = buf.get_u32_le();
    if magic != STATE_MAGIC {
        return Err(WireError::BadMagic {
            expected: STATE_MAGIC,
            actual: magic,
        });
    }

    Ok(SimulatedState {
        timestamp_us: buf.get_u64_le(),
        latitude: buf.get_f64_le(),
        longitude: buf.get_f64_le(),
        altitude: buf.get_f64_le(),
        roll_deg: buf.get_f64_le(),
        pitch_deg: buf.get_f64_le(),
        yaw_deg: buf.get_f64_le(),
        airspeed: buf.get_f64_le(),
        velocity_air_bf: [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()],
        height_agl: buf.get_f32_le(),
        motor_mask: ChannelMask::from_bits(buf.get_u32_le()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SimulatedState {
        SimulatedState {
            timestamp_us: 1_234_567,
            latitude: -35.363261,
            longitude: 149.165230,
            altitude: 584.0,
            roll_deg: 1.5,
            pitch_deg: -2.0,
            yaw_deg: 90.0,
            airspeed: 12.0,
            velocity_air_bf: [12.0, 0.5, -0.25],
            height_agl: 10.0,
            motor_mask: ChannelMask::from_bits(0x0F),
        }
    }

    #[test]
    fn test_state_layout() {
        let state = sample_state();
        let buf = encode_state(&state);
        assert_eq!(buf.len(), STATE_PACKET_SIZE);
        assert_eq!(&buf[0..4], b"SITL");
        assert_eq!(&buf[4..12], &1_234_567u64.to_le_bytes());
        assert_eq!(&buf[84..88], &0x0Fu32.to_le_bytes());
        assert_eq!(decode_state(&buf).unwrap(), state);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let buf = encode_state(&sample_state());
        let err = decode_state(&buf[..40]).unwrap_err();
        assert_eq!(
            err,
            WireError::WrongLength {
                packet: "state",
                expected: STATE_PACKET_SIZE,
                actual: 40
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut buf = encode_state(&sample_state());
        buf[0] = b'X';
        assert!(matches!(decode_state(&buf), Err(WireError::BadMagic { .. })));
    }
}
