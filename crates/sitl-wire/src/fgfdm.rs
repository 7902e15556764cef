//! FlightGear `FGNetFDM` visualization packet (protocol version 24).
//!
//! Only the fields a viewer needs are populated; the rest are sent as zero.
//! The packet is big-endian on the wire.
//!
//! ```text
//! offset  size  field
//!      0     4  version (u32)
//!      4     4  padding
//!      8    24  longitude, latitude, altitude (3 x f64, rad/rad/m)
//!     32    88  agl .. slip_deg (22 x f32)
//!    120     4  num_engines (u32)
//!    124    16  eng_state[4] (u32)
//!    140   144  rpm, fuel_flow, fuel_px, egt, cht, mp_osi, tit, oil_temp, oil_px (9 x 4 x f32)
//!    284     4  num_tanks (u32)
//!    288    16  fuel_quantity[4] (f32)
//!    304     4  num_wheels (u32)
//!    308    12  wow[3] (u32)
//!    320    36  gear_pos, gear_steer, gear_compression (3 x 3 x f32)
//!    356    12  cur_time (u32), warp (i32), visibility (f32)
//!    368    40  control surfaces (10 x f32)
//! ```

use bytes::BufMut;
use sitl_common::{SimulatedState, VehicleType, NUM_CHANNELS};

/// Protocol version carried in the header.
pub const FG_NET_FDM_VERSION: u32 = 0x18;

/// Size of an encoded packet.
pub const FG_NET_FDM_SIZE: usize = 408;

/// Meters per foot.
const FEET_TO_METERS: f32 = 0.3048;

/// Number of single-precision fields between `agl` and `slip_deg`.
const ATTITUDE_BLOCK_FLOATS: usize = 22;

/// The populated subset of an `FGNetFDM` packet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlightGearFrame {
    /// Longitude in radians.
    pub longitude: f64,
    /// Latitude in radians.
    pub latitude: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Height above ground in meters.
    pub agl: f32,
    /// Roll in radians.
    pub phi: f32,
    /// Pitch in radians.
    pub theta: f32,
    /// Yaw in radians.
    pub psi: f32,
    /// Calibrated airspeed in feet per second.
    pub vcas: f32,
    /// Number of engines reported.
    pub num_engines: u32,
    /// Per-engine RPM estimate.
    pub rpm: [f32; 4],
}

impl FlightGearFrame {
    /// Build a frame from a simulated state and the raw firmware outputs.
    ///
    /// The `agl` field carries the altitude above sea level, which is what
    /// viewers expect for placing the model.
    pub fn from_state(
        state: &SimulatedState,
        vehicle: VehicleType,
        pwm_output: &[u16; NUM_CHANNELS],
    ) -> Self {
        let pwm = |ch: usize| pwm_output[ch] as f32 - 1000.0;
        let rpm = match vehicle {
            VehicleType::Copter => [
                pwm(0).clamp(0.0, 1000.0),
                pwm(1).clamp(0.0, 1000.0),
                pwm(2).clamp(0.0, 1000.0),
                pwm(3).clamp(0.0, 1000.0),
            ],
            _ => [
                (pwm(2) * 3.0).clamp(0.0, 3000.0),
                (pwm(5) * 12.0).clamp(0.0, 12000.0),
                (pwm(6) * 12.0).clamp(0.0, 12000.0),
                (pwm(7) * 12.0).clamp(0.0, 12000.0),
            ],
        };

        FlightGearFrame {
            longitude: state.longitude.to_radians(),
            latitude: state.latitude.to_radians(),
            altitude: state.altitude,
            agl: state.altitude as f32,
            phi: (state.roll_deg as f32).to_radians(),
            theta: (state.pitch_deg as f32).to_radians(),
            psi: (state.yaw_deg as f32).to_radians(),
            vcas: state.air_speed_magnitude() / FEET_TO_METERS,
            num_engines: 4,
            rpm,
        }
    }

    /// Encode as a big-endian `FGNetFDM` packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FG_NET_FDM_SIZE);
        buf.put_u32(FG_NET_FDM_VERSION);
        buf.put_u32(0);

        buf.put_f64(self.longitude);
        buf.put_f64(self.latitude);
        buf.put_f64(self.altitude);

        // agl, phi, theta, psi, alpha, beta, phidot, thetadot, psidot, vcas, ...
        let mut attitude = [0.0f32; ATTITUDE_BLOCK_FLOATS];
        attitude[0] = self.agl;
        attitude[1] = self.phi;
        attitude[2] = self.theta;
        attitude[3] = self.psi;
        attitude[9] = self.vcas;
        for v in attitude {
            buf.put_f32(v);
        }

        buf.put_u32(self.num_engines);
        put_zeros_u32(&mut buf, 4);
        for v in self.rpm {
            buf.put_f32(v);
        }
        // fuel_flow, fuel_px, egt, cht, mp_osi, tit, oil_temp, oil_px
        put_zeros_u32(&mut buf, 8 * 4);

        // Tanks
        buf.put_u32(0);
        put_zeros_u32(&mut buf, 4);

        // Wheels
        buf.put_u32(0);
        put_zeros_u32(&mut buf, 3 + 3 * 3);

        // cur_time, warp, visibility
        put_zeros_u32(&mut buf, 3);

        // Control surfaces
        put_zeros_u32(&mut buf, 10);

        buf
    }
}

fn put_zeros_u32(buf: &mut Vec<u8>, count: usize) {
    buf.put_bytes(0, count * 4);
}
