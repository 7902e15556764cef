//! Data exchanged with the flight dynamics model.

use crate::{ChannelMask, SimTime, NUM_CHANNELS};
use serde::{Deserialize, Serialize};

/// Vehicle state produced by the flight dynamics model for one tick.
///
/// Everything here is owned by the model except `height_agl`, which the
/// bridge recomputes after every step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulatedState {
    /// Simulation timestamp in microseconds.
    pub timestamp_us: u64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in meters.
    pub altitude: f64,
    /// Roll in degrees.
    pub roll_deg: f64,
    /// Pitch in degrees.
    pub pitch_deg: f64,
    /// Yaw in degrees.
    pub yaw_deg: f64,
    /// Equivalent airspeed in m/s.
    pub airspeed: f64,
    /// Velocity relative to the airmass, body frame, m/s.
    pub velocity_air_bf: [f32; 3],
    /// Height above ground level in meters.
    pub height_agl: f32,
    /// Channels that drive motors.
    pub motor_mask: ChannelMask,
}

impl SimulatedState {
    /// The state's timestamp as a [`SimTime`].
    pub fn timestamp(&self) -> SimTime {
        SimTime::from_micros(self.timestamp_us)
    }

    /// Magnitude of the body-frame airspeed vector in m/s.
    pub fn air_speed_magnitude(&self) -> f32 {
        let [x, y, z] = self.velocity_air_bf;
        (x * x + y * y + z * z).sqrt()
    }
}

/// Wind passed to the flight dynamics model alongside the actuator values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindDescriptor {
    /// Horizontal wind speed in m/s.
    pub speed: f32,
    /// Direction the wind blows from, degrees in (-180, 180].
    pub direction: f32,
    /// Turbulence intensity.
    pub turbulence: f32,
    /// Vertical wind angle in degrees.
    pub dir_z: f32,
}

/// Input handed to the flight dynamics model for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorInput {
    /// Per-channel actuation values. Zero means "not driven".
    pub servos: [u16; NUM_CHANNELS],
    /// Wind to apply during this tick.
    pub wind: WindDescriptor,
}

impl Default for ActuatorInput {
    fn default() -> Self {
        ActuatorInput {
            servos: [0; NUM_CHANNELS],
            wind: WindDescriptor::default(),
        }
    }
}

impl ActuatorInput {
    /// Channel value normalized from the 1000..2000 range into [0, 1].
    pub fn normalized(&self, channel: usize) -> f32 {
        let raw = self.servos.get(channel).copied().unwrap_or(0) as f32;
        ((raw - 1000.0) / 1000.0).clamp(0.0, 1.0)
    }
}
