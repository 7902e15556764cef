//! Minimal built-in flight model.
//!
//! A vertical point mass lifted by the mean motor output, so the bridge can
//! run without an external simulator attached. Not intended for anything
//! beyond exercising the firmware loop and the network outputs.

use crate::model::FlightModel;
use crate::realtime::{RealTimeConfig, RealTimePacer};
use serde::{Deserialize, Serialize};
use sitl_common::{ActuatorInput, ChannelMask, SimTime, SimulatedState, VehicleType};
use tracing::{info, warn};

const GRAVITY: f64 = 9.80665;

/// Home location of the demo vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in meters.
    pub altitude: f64,
}

impl Default for HomeLocation {
    fn default() -> Self {
        HomeLocation {
            latitude: -35.363261,
            longitude: 149.165230,
            altitude: 584.0,
        }
    }
}

/// Fastest physics rate; each step must advance the clock by at least 1 µs.
pub const MAX_RATE_HZ: u32 = 1_000_000;

/// Demo model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    /// Physics rate in Hz.
    pub rate_hz: u32,
    /// Throttle at which thrust equals weight.
    pub hover_throttle: f64,
    /// Home location.
    pub home: HomeLocation,
}

impl Default for HoverConfig {
    fn default() -> Self {
        HoverConfig {
            rate_hz: 400,
            hover_throttle: 0.5,
            home: HomeLocation::default(),
        }
    }
}

/// Vertical point-mass model.
#[derive(Debug)]
pub struct HoverModel {
    config: HoverConfig,
    motors: ChannelMask,
    dt_us: u64,
    time_us: u64,
    height: f64,
    climb_rate: f64,
    steps: u64,
    pacer: RealTimePacer,
}

impl HoverModel {
    /// Create a model for a vehicle, paced against wall-clock time.
    pub fn new(vehicle: VehicleType, config: HoverConfig, pacing: RealTimeConfig) -> Self {
        let motors = match vehicle {
            VehicleType::Copter => ChannelMask::from_bits(0b1111),
            VehicleType::Sub => ChannelMask::from_bits(0b1111_1111),
            VehicleType::Plane | VehicleType::Rover => ChannelMask::from_bits(0b0100),
        };
        let dt_us = 1_000_000 / u64::from(config.rate_hz.clamp(1, MAX_RATE_HZ));
        HoverModel {
            config,
            motors,
            dt_us,
            time_us: 0,
            height: 0.0,
            climb_rate: 0.0,
            steps: 0,
            pacer: RealTimePacer::new(pacing, SimTime::ZERO),
        }
    }

    /// Height above home in meters.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Step length in microseconds.
    pub fn dt_us(&self) -> u64 {
        self.dt_us
    }

    fn lift_fraction(&self, input: &ActuatorInput) -> f64 {
        let n = self.motors.len();
        if n == 0 {
            return 0.0;
        }
        let total: f32 = self.motors.iter().map(|ch| input.normalized(ch)).sum();
        f64::from(total) / n as f64
    }

    fn pace(&mut self) {
        let now = SimTime::from_micros(self.time_us);
        if let Some(sleep) = self.pacer.sleep_until(now) {
            std::thread::sleep(sleep);
        }
        if let Some(lag_ms) = self.pacer.check_lag_warning(now) {
            warn!(lag_ms, "simulation running behind wall clock");
        }
        if let Some(stats) = self.pacer.check_periodic_stats(now, self.steps) {
            let memory = stats.memory_human_readable();
            info!(
                sim_time = %stats.sim_time,
                ratio = format!("{:.2}x", stats.sim_to_realtime_ratio),
                steps_per_s = format!("{:.0}", stats.step_rate_real),
                steps_per_sim_s = format!("{:.0}", stats.step_rate_sim),
                memory = memory.trim(),
                "periodic stats"
            );
        }
    }
}

impl FlightModel for HoverModel {
    fn update(&mut self, input: &ActuatorInput) -> SimulatedState {
        let dt = self.dt_us as f64 * 1.0e-6;
        let thrust = GRAVITY * self.lift_fraction(input) / self.config.hover_throttle.max(0.05);
        let accel = thrust - GRAVITY;

        self.climb_rate += accel * dt;
        self.height += self.climb_rate * dt;
        if self.height <= 0.0 {
            self.height = 0.0;
            self.climb_rate = self.climb_rate.max(0.0);
        }

        self.time_us += self.dt_us;
        self.steps += 1;
        self.pace();

        // Stationary vehicle: the air moves past it with the wind.
        let velocity_air_bf = [-input.wind.speed, 0.0, -(self.climb_rate as f32)];
        let airspeed = {
            let [x, y, z] = velocity_air_bf;
            f64::from((x * x + y * y + z * z).sqrt())
        };

        SimulatedState {
            timestamp_us: self.time_us,
            latitude: self.config.home.latitude,
            longitude: self.config.home.longitude,
            altitude: self.config.home.altitude + self.height,
            roll_deg: 0.0,
            pitch_deg: 0.0,
            yaw_deg: f64::from(input.wind.direction),
            airspeed,
            velocity_air_bf,
            height_agl: 0.0,
            motor_mask: self.motors,
        }
    }

    fn speedup(&self) -> f64 {
        self.pacer.config().speedup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(vehicle: VehicleType) -> HoverModel {
        HoverModel::new(vehicle, HoverConfig::default(), RealTimeConfig::unpaced())
    }

    fn input(value: u16) -> ActuatorInput {
        let mut input = ActuatorInput::default();
        input.servos = [value; sitl_common::NUM_CHANNELS];
        input
    }

    #[test]
    fn test_timestamps_advance_at_rate() {
        let mut m = model(VehicleType::Copter);
        let a = m.update(&input(1000));
        let b = m.update(&input(1000));
        assert_eq!(a.timestamp_us, 2500);
        assert_eq!(b.timestamp_us, 5000);
    }

    #[test]
    fn test_stays_on_ground_when_idle() {
        let mut m = model(VehicleType::Copter);
        for _ in 0..400 {
            m.update(&input(1000));
        }
        assert_eq!(m.height(), 0.0);
    }

    #[test]
    fn test_climbs_above_hover_throttle() {
        let mut m = model(VehicleType::Copter);
        let mut state = SimulatedState::default();
        for _ in 0..400 {
            state = m.update(&input(1700));
        }
        assert!(m.height() > 1.0);
        assert!(state.altitude > HomeLocation::default().altitude);
        assert_eq!(state.motor_mask.bits(), 0b1111);
    }

    #[test]
    fn test_step_never_zero_length() {
        for rate_hz in [0, MAX_RATE_HZ, u32::MAX] {
            let config = HoverConfig {
                rate_hz,
                ..Default::default()
            };
            let m = HoverModel::new(VehicleType::Copter, config, RealTimeConfig::unpaced());
            assert!(m.dt_us() >= 1);
        }
    }

    #[test]
    fn test_speedup_reported() {
        let m = HoverModel::new(
            VehicleType::Plane,
            HoverConfig::default(),
            RealTimeConfig::with_speedup(5.0),
        );
        assert_eq!(m.speedup(), 5.0);
    }
}
