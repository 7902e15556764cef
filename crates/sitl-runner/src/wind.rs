//! Wind slew and altitude profile.
//!
//! The configured wind targets are never applied as a step. Active values
//! follow the targets through a first-order low-pass filter, after a grace
//! period during which the vehicle sees no wind at all.

use sitl_common::{wrap_180, SimTime, WindDescriptor};
use sitl_params::{
    ParamStore, SIM_WIND_DIR, SIM_WIND_DIR_Z, SIM_WIND_SPD, SIM_WIND_T, SIM_WIND_TC,
    SIM_WIND_TURB, SIM_WIND_T_ALT, SIM_WIND_T_COEF,
};

/// Time after the first call during which wind is held at zero.
pub const WIND_GRACE_PERIOD: SimTime = SimTime::from_millis(5_000);

/// Minimum interval between filter updates.
const MIN_UPDATE_INTERVAL_US: u64 = 1000;

/// Lower bound for the filter time constant in seconds.
const MIN_TIME_CONSTANT: f32 = 0.1;

// ============================================================================
// Settings
// ============================================================================

/// How wind speed varies with height above ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindProfile {
    /// Speed rolls off with the square root of height below the reference.
    SquareRoot,
    /// Speed is not altered.
    NoLimit,
    /// Speed changes linearly with height relative to the reference.
    Coefficient,
}

impl WindProfile {
    /// Decode the profile parameter. Unknown values apply no limit.
    pub fn from_param(value: i8) -> Self {
        match value {
            0 => WindProfile::SquareRoot,
            2 => WindProfile::Coefficient,
            _ => WindProfile::NoLimit,
        }
    }
}

/// Configured wind targets, read from parameters each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSettings {
    /// Target speed in m/s.
    pub speed: f32,
    /// Target direction in degrees.
    pub direction: f32,
    /// Target vertical angle in degrees.
    pub dir_z: f32,
    /// Turbulence passed through to the model.
    pub turbulence: f32,
    /// Filter time constant in seconds.
    pub time_constant: f32,
    /// Altitude profile.
    pub profile: WindProfile,
    /// Profile reference height in meters.
    pub profile_alt: f32,
    /// Linear profile coefficient.
    pub profile_coef: f32,
}

impl WindSettings {
    /// Read the current wind parameters.
    pub fn from_params(params: &ParamStore) -> Self {
        WindSettings {
            speed: params.get(&SIM_WIND_SPD),
            direction: params.get(&SIM_WIND_DIR),
            dir_z: params.get(&SIM_WIND_DIR_Z),
            turbulence: params.get(&SIM_WIND_TURB),
            time_constant: params.get(&SIM_WIND_TC),
            profile: WindProfile::from_param(params.get(&SIM_WIND_T)),
            profile_alt: params.get(&SIM_WIND_T_ALT),
            profile_coef: params.get(&SIM_WIND_T_COEF),
        }
    }
}

impl Default for WindSettings {
    fn default() -> Self {
        WindSettings::from_params(&ParamStore::new())
    }
}

// ============================================================================
// Wind Model
// ============================================================================

/// Stateful wind filter.
#[derive(Debug, Clone, Default)]
pub struct WindModel {
    /// Time of the first call, which starts the grace period.
    start: Option<SimTime>,
    /// Time of the last filter update.
    last_update: SimTime,
    speed_active: f32,
    direction_active: f32,
    dir_z_active: f32,
}

impl WindModel {
    /// Create a wind model with all active values at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the filter to `now` and return the wind to apply this tick.
    ///
    /// `height_agl` is the height above ground from the previous tick and
    /// selects the altitude profile scaling.
    pub fn advance(&mut self, now: SimTime, height_agl: f32, settings: &WindSettings) -> WindDescriptor {
        let mut wind = WindDescriptor {
            turbulence: settings.turbulence,
            ..Default::default()
        };

        let start = match self.start {
            Some(start) => start,
            None => {
                self.start = Some(now);
                self.last_update = now;
                return wind;
            }
        };
        if now.since(start) <= WIND_GRACE_PERIOD {
            return wind;
        }

        let dt_us = now.since(self.last_update).as_micros();
        if dt_us > MIN_UPDATE_INTERVAL_US {
            self.last_update = now;
            let dt = dt_us as f32 * 1.0e-6;
            let tc = settings.time_constant.max(MIN_TIME_CONSTANT);
            let alpha = lowpass_alpha(dt, 1.0 / tc);
            self.speed_active += (settings.speed - self.speed_active) * alpha;
            self.direction_active += wrap_180(settings.direction - self.direction_active) * alpha;
            self.dir_z_active += (settings.dir_z - self.dir_z_active) * alpha;
            self.direction_active = wrap_180(self.direction_active);
        }

        let speed = match settings.profile {
            WindProfile::SquareRoot => {
                if height_agl < settings.profile_alt {
                    self.speed_active * (height_agl / settings.profile_alt).max(0.0).sqrt()
                } else {
                    self.speed_active
                }
            }
            WindProfile::Coefficient => {
                self.speed_active + (height_agl - settings.profile_alt) * settings.profile_coef
            }
            WindProfile::NoLimit => self.speed_active,
        };

        wind.speed = speed.max(0.0);
        wind.direction = self.direction_active;
        wind.dir_z = self.dir_z_active;
        wind
    }

    /// Slewed speed before the altitude profile is applied.
    pub fn active_speed(&self) -> f32 {
        self.speed_active
    }
}

/// Smoothing factor of a first-order low-pass filter for a time step and
/// cutoff frequency in Hz.
fn lowpass_alpha(dt: f32, cutoff_hz: f32) -> f32 {
    if dt <= 0.0 || cutoff_hz <= 0.0 {
        return 1.0;
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    dt / (dt + rc)
}
