//! # sitl-common
//!
//! Common types shared by the SITL bridge crates.
//!
//! This crate provides:
//! - Time representation ([`SimTime`])
//! - Channel bitsets ([`ChannelMask`])
//! - Vehicle identity ([`VehicleType`])
//! - Angle wrapping ([`wrap_180`])
//! - The state produced by the flight dynamics model ([`SimulatedState`])
//! - The input consumed by the flight dynamics model ([`ActuatorInput`], [`WindDescriptor`])

mod mask;
mod state;

pub use mask::{ChannelMask, ChannelMaskIter};
pub use state::{ActuatorInput, SimulatedState, WindDescriptor};

use serde::{Deserialize, Serialize};

// ============================================================================
// Channel Constants
// ============================================================================

/// Number of actuator channel slots passed to the flight dynamics model.
pub const NUM_CHANNELS: usize = 32;

/// Raw output value meaning "this channel is not being driven".
pub const PWM_INACTIVE: u16 = 0xFFFF;

/// Lowest valid actuation value. Also the disarmed default for motors.
pub const PWM_MIN: u16 = 1000;

/// Highest valid actuation value.
pub const PWM_MAX: u16 = 2000;

/// Mid-travel value used for centered surfaces and reversible motors.
pub const PWM_NEUTRAL: u16 = 1500;

// ============================================================================
// Time Types
// ============================================================================

/// Simulation time in microseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Zero time.
    pub const ZERO: SimTime = SimTime(0);

    /// Create from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        SimTime(us)
    }

    /// Create from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms * 1000)
    }

    /// Create from seconds (float).
    pub fn from_secs(s: f64) -> Self {
        SimTime((s * 1_000_000.0) as u64)
    }

    /// Get as microseconds.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get as milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Get as seconds (float).
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Time elapsed since `earlier`, saturating at zero.
    pub fn since(&self, earlier: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(earlier.0))
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Self) -> Self::Output {
        SimTime(self.0 + rhs.0)
    }
}

impl std::ops::Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: Self) -> Self::Output {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

// ============================================================================
// Angle Helpers
// ============================================================================

/// Wrap an angle in degrees into (-180, 180].
pub fn wrap_180(angle_deg: f32) -> f32 {
    let wrapped = angle_deg.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

// ============================================================================
// Vehicle Identity
// ============================================================================

/// The kind of vehicle the firmware under test controls.
///
/// Selected once at startup. It decides the disarmed channel defaults, the
/// neutral point used for engine failure injection, and how the aggregate
/// throttle estimate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    /// Multirotor (and any other rotor-lifted vehicle).
    #[default]
    Copter,
    /// Fixed-wing, including hybrid VTOL designs.
    Plane,
    /// Ground vehicle with reversible throttle.
    Rover,
    /// Underwater vehicle with bidirectional thrusters.
    Sub,
}

impl VehicleType {
    /// Channel values used before the firmware has produced valid outputs.
    pub fn disarmed_outputs(&self) -> [u16; NUM_CHANNELS] {
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        let centered: &[usize] = match self {
            VehicleType::Copter => &[],
            VehicleType::Plane => &[0, 1, 3],
            VehicleType::Rover => &[0, 1, 2, 3],
            VehicleType::Sub => &[0, 1, 2, 3, 4, 5, 6, 7],
        };
        for &ch in centered {
            pwm[ch] = PWM_NEUTRAL;
        }
        pwm
    }

    /// Whether motor channels are reversible around mid-travel.
    ///
    /// Only the ground vehicle is treated as reversible for failure injection.
    pub fn has_reversible_motors(&self) -> bool {
        matches!(self, VehicleType::Rover)
    }

    /// The channel value a failed motor decays towards.
    pub fn failure_neutral(&self) -> f32 {
        if self.has_reversible_motors() {
            PWM_NEUTRAL as f32
        } else {
            PWM_MIN as f32
        }
    }

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Copter => "copter",
            VehicleType::Plane => "plane",
            VehicleType::Rover => "rover",
            VehicleType::Sub => "sub",
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copter" | "multirotor" | "quad" | "heli" => Ok(VehicleType::Copter),
            "plane" | "fixed-wing" | "fixedwing" | "quadplane" => Ok(VehicleType::Plane),
            "rover" | "ground" | "boat" => Ok(VehicleType::Rover),
            "sub" => Ok(VehicleType::Sub),
            other => Err(format!(
                "Unknown vehicle type '{}'. Use copter, plane, rover or sub.",
                other
            )),
        }
    }
}
