//! Parameter constant definitions.
//!
//! The description string is what `sitl params` prints, so it should be
//! complete on its own: what the parameter controls and its valid values.

use super::types::{Param, ParamType};

// ============================================================================
// Wind
// ============================================================================

/// Target wind speed.
pub const SIM_WIND_SPD: Param<f32> = Param::new(
    "SIM_WIND_SPD",
    "Target horizontal wind speed",
    ParamType::Float,
    0.0,
)
.with_unit("m/s");

/// Target wind direction.
pub const SIM_WIND_DIR: Param<f32> = Param::new(
    "SIM_WIND_DIR",
    "Target direction the wind blows from (0 = north)",
    ParamType::Float,
    180.0,
)
.with_unit("deg");

/// Target vertical wind angle.
pub const SIM_WIND_DIR_Z: Param<f32> = Param::new(
    "SIM_WIND_DIR_Z",
    "Target vertical wind angle (positive = updraft)",
    ParamType::Float,
    0.0,
)
.with_unit("deg");

/// Turbulence intensity, passed through to the physics model.
pub const SIM_WIND_TURB: Param<f32> = Param::new(
    "SIM_WIND_TURB",
    "Wind turbulence intensity passed through to the physics model",
    ParamType::Float,
    0.0,
)
.with_unit("m/s");

/// Slew time constant for the active wind values.
pub const SIM_WIND_TC: Param<f32> = Param::new(
    "SIM_WIND_TC",
    "Time constant of the wind low-pass filter; values below 0.1 are treated as 0.1",
    ParamType::Float,
    5.0,
)
.with_unit("s");

/// Altitude profile selector.
pub const SIM_WIND_T: Param<i8> = Param::new(
    "SIM_WIND_T",
    "Wind altitude profile: 0 = square-root roll-off below SIM_WIND_T_ALT, \
     1 = no limit, 2 = linear coefficient SIM_WIND_T_COEF per meter from SIM_WIND_T_ALT",
    ParamType::Int8,
    0.0,
);

/// Reference altitude for the wind profile.
pub const SIM_WIND_T_ALT: Param<f32> = Param::new(
    "SIM_WIND_T_ALT",
    "Reference height above ground for the wind altitude profile",
    ParamType::Float,
    60.0,
)
.with_unit("m");

/// Linear profile coefficient.
pub const SIM_WIND_T_COEF: Param<f32> = Param::new(
    "SIM_WIND_T_COEF",
    "Wind speed change per meter of height difference from SIM_WIND_T_ALT (profile 2)",
    ParamType::Float,
    0.01,
)
.with_unit("1/s");

// ============================================================================
// Actuators
// ============================================================================

/// Engine failure multiplier.
pub const SIM_ENGINE_MUL: Param<f32> = Param::new(
    "SIM_ENGINE_MUL",
    "Output multiplier for failed engines: 0 = full failure, 1 = no effect",
    ParamType::Float,
    1.0,
);

/// Channels affected by engine failure.
pub const SIM_ENGINE_FAIL: Param<u32> = Param::new(
    "SIM_ENGINE_FAIL",
    "Bitmask of output channels to which SIM_ENGINE_MUL is applied",
    ParamType::Int32,
    0.0,
);

/// Channels driven by multicast overrides.
pub const SIM_CAN_SRV_MSK: Param<u32> = Param::new(
    "SIM_CAN_SRV_MSK",
    "Bitmask of output channels whose value is taken from multicast servo overrides",
    ParamType::Int32,
    0.0,
);

// ============================================================================
// Environment
// ============================================================================

/// Terrain lookup enable.
pub const SIM_TERRAIN: Param<bool> = Param::new(
    "SIM_TERRAIN",
    "Use the terrain service for height above ground (0 = flat earth at home altitude)",
    ParamType::Int8,
    1.0,
);

/// Simulation speedup.
pub const SIM_SPEEDUP: Param<f32> = Param::new(
    "SIM_SPEEDUP",
    "Ratio of simulated time to wall-clock time; values below 1 run at real time",
    ParamType::Float,
    1.0,
);
