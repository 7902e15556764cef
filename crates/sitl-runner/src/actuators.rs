//! Actuator translation.
//!
//! Turns the firmware's raw servo outputs into the [`ActuatorInput`] consumed
//! by the flight dynamics model. Applies, in order: disarmed defaults, the
//! inactive sentinel, peripheral simulators, engine failure injection,
//! multicast overrides, throttle estimation and wind.

use crate::error::{Result, SitlError};
use crate::multicast::OverrideTable;
use sitl_common::{
    ActuatorInput, ChannelMask, VehicleType, WindDescriptor, NUM_CHANNELS, PWM_INACTIVE, PWM_MAX,
    PWM_MIN, PWM_NEUTRAL,
};
use sitl_params::{ParamStore, SIM_CAN_SRV_MSK, SIM_ENGINE_FAIL, SIM_ENGINE_MUL};
use tracing::trace;

/// Index of the throttle channel on planes and rovers.
const THROTTLE_CHANNEL: usize = 2;

/// Index of the steering channel on rovers.
const STEERING_CHANNEL: usize = 0;

// ============================================================================
// Peripherals
// ============================================================================

/// A simulated peripheral that rewrites actuator values, such as a serial ESC
/// or a smart servo bus.
pub trait PeripheralSim: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether the peripheral is currently attached.
    fn enabled(&self) -> bool {
        true
    }

    /// Channels this peripheral drives.
    fn claims(&self) -> ChannelMask;

    /// Rewrite the claimed channels of `input`.
    fn transform(&mut self, input: &mut ActuatorInput);
}

// ============================================================================
// Settings
// ============================================================================

/// Failure injection and override settings, read from parameters each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorSettings {
    /// Multiplier applied to failed engines (0 = dead, 1 = healthy).
    pub engine_mul: f32,
    /// Channels subject to engine failure.
    pub engine_fail: ChannelMask,
    /// Channels driven by multicast overrides.
    pub override_mask: ChannelMask,
}

impl ActuatorSettings {
    /// Read the current actuator parameters.
    pub fn from_params(params: &ParamStore) -> Self {
        ActuatorSettings {
            engine_mul: params.get(&SIM_ENGINE_MUL),
            engine_fail: ChannelMask::from_bits(params.get(&SIM_ENGINE_FAIL)),
            override_mask: ChannelMask::from_bits(params.get(&SIM_CAN_SRV_MSK)),
        }
    }
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        ActuatorSettings {
            engine_mul: 1.0,
            engine_fail: ChannelMask::EMPTY,
            override_mask: ChannelMask::EMPTY,
        }
    }
}

// ============================================================================
// Translator
// ============================================================================

/// Builds the model input for each tick.
pub struct ActuatorTranslator {
    vehicle: VehicleType,
    initialized: bool,
    peripherals: Vec<Box<dyn PeripheralSim>>,
    throttle: f32,
}

impl ActuatorTranslator {
    /// Create a translator for a vehicle.
    pub fn new(vehicle: VehicleType) -> Self {
        ActuatorTranslator {
            vehicle,
            initialized: false,
            peripherals: Vec::new(),
            throttle: 0.0,
        }
    }

    /// Attach a peripheral simulator. Peripherals run in attach order.
    pub fn add_peripheral(&mut self, peripheral: Box<dyn PeripheralSim>) {
        self.peripherals.push(peripheral);
    }

    /// The vehicle this translator was built for.
    pub fn vehicle(&self) -> VehicleType {
        self.vehicle
    }

    /// Throttle estimate from the last [`build`](Self::build), in [0, 1].
    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    /// Build the model input from the firmware's output table.
    ///
    /// Until the firmware reports ready, `pwm_output` itself is reset to the
    /// vehicle's disarmed defaults. `motor_mask` comes from the previous
    /// state and selects the channels averaged for the hover estimate.
    pub fn build(
        &mut self,
        pwm_output: &mut [u16; NUM_CHANNELS],
        output_ready: bool,
        wind: WindDescriptor,
        overrides: &OverrideTable,
        motor_mask: ChannelMask,
        settings: &ActuatorSettings,
    ) -> Result<ActuatorInput> {
        if !self.initialized || !output_ready {
            *pwm_output = self.vehicle.disarmed_outputs();
            self.initialized = true;
        }

        let mut input = ActuatorInput::default();
        for (servo, &raw) in input.servos.iter_mut().zip(pwm_output.iter()) {
            *servo = if raw == PWM_INACTIVE { 0 } else { raw };
        }

        for peripheral in self.peripherals.iter_mut().filter(|p| p.enabled()) {
            peripheral.transform(&mut input);
            for channel in peripheral.claims() {
                let value = input.servos[channel];
                if value != 0 && value < PWM_MIN {
                    return Err(SitlError::InvalidActuatorValue {
                        peripheral: peripheral.name().to_string(),
                        channel,
                        value,
                    });
                }
            }
        }

        let neutral = self.vehicle.failure_neutral();
        for channel in settings.engine_fail {
            let raw = input.servos[channel] as f32;
            input.servos[channel] = ((raw - neutral) * settings.engine_mul + neutral) as u16;
        }

        for channel in settings.override_mask {
            input.servos[channel] = overrides.get(channel);
        }

        self.throttle = self.estimate_throttle(&mut input, motor_mask);
        trace!(throttle = self.throttle, "actuator input built");

        input.wind = wind;
        Ok(input)
    }

    fn estimate_throttle(&self, input: &mut ActuatorInput, motor_mask: ChannelMask) -> f32 {
        match self.vehicle {
            VehicleType::Plane => {
                let forward = input.normalized(THROTTLE_CHANNEL);
                if forward != 0.0 {
                    forward
                } else {
                    running_motor_mean(input, motor_mask)
                }
            }
            VehicleType::Rover => {
                let throttle = if input.servos[THROTTLE_CHANNEL] != 0 {
                    let clamped = input.servos[THROTTLE_CHANNEL].clamp(PWM_MIN, PWM_MAX);
                    input.servos[THROTTLE_CHANNEL] = clamped;
                    (clamped as f32 - PWM_NEUTRAL as f32).abs() / 500.0
                } else {
                    0.0
                };
                input.servos[STEERING_CHANNEL] =
                    input.servos[STEERING_CHANNEL].clamp(PWM_MIN, PWM_MAX);
                throttle
            }
            VehicleType::Copter | VehicleType::Sub => running_motor_mean(input, motor_mask),
        }
    }
}

/// Mean normalized value of the motors in `mask` that are turning.
fn running_motor_mean(input: &ActuatorInput, mask: ChannelMask) -> f32 {
    let (sum, running) = mask
        .iter()
        .map(|motor| input.normalized(motor))
        .filter(|&t| t != 0.0)
        .fold((0.0_f32, 0_u32), |(sum, n), t| (sum + t, n + 1));
    if running > 0 {
        sum / running as f32
    } else {
        0.0
    }
}

impl std::fmt::Debug for ActuatorTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorTranslator")
            .field("vehicle", &self.vehicle)
            .field("initialized", &self.initialized)
            .field("peripherals", &self.peripherals.len())
            .field("throttle", &self.throttle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD: ChannelMask = ChannelMask::from_bits(0b1111);

    fn build(
        translator: &mut ActuatorTranslator,
        pwm: &mut [u16; NUM_CHANNELS],
        settings: &ActuatorSettings,
    ) -> ActuatorInput {
        translator
            .build(pwm, true, WindDescriptor::default(), &OverrideTable::new(), QUAD, settings)
            .unwrap()
    }

    /// Peripheral that writes a fixed value to one channel.
    struct FixedEsc {
        channel: usize,
        value: u16,
    }

    impl PeripheralSim for FixedEsc {
        fn name(&self) -> &str {
            "fixed-esc"
        }

        fn claims(&self) -> ChannelMask {
            ChannelMask::from_bits(1 << self.channel)
        }

        fn transform(&mut self, input: &mut ActuatorInput) {
            input.servos[self.channel] = self.value;
        }
    }

    #[test]
    fn test_first_call_resets_to_defaults() {
        let mut translator = ActuatorTranslator::new(VehicleType::Plane);
        let mut pwm = [1700; NUM_CHANNELS];
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(&input.servos[..4], &[1500, 1500, 1000, 1500]);
        assert_eq!(pwm, VehicleType::Plane.disarmed_outputs());

        // Second call with outputs ready passes values through.
        pwm[2] = 1200;
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(input.servos[2], 1200);
    }

    #[test]
    fn test_not_ready_keeps_defaults() {
        let mut translator = ActuatorTranslator::new(VehicleType::Sub);
        let mut pwm = [1900; NUM_CHANNELS];
        for _ in 0..3 {
            let input = translator
                .build(
                    &mut pwm,
                    false,
                    WindDescriptor::default(),
                    &OverrideTable::new(),
                    QUAD,
                    &ActuatorSettings::default(),
                )
                .unwrap();
            assert!(input.servos[..8].iter().all(|&v| v == PWM_NEUTRAL));
            assert_eq!(input.servos[8], PWM_MIN);
        }
    }

    #[test]
    fn test_inactive_sentinel_maps_to_zero() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        pwm[5] = PWM_INACTIVE;
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(input.servos[5], 0);
    }

    #[test]
    fn test_copter_throttle_mean() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        pwm[..4].copy_from_slice(&[1500, 1500, 1500, 1500]);
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_relative_eq!(translator.throttle(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_copter_throttle_ignores_stopped_motors() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        pwm[..4].copy_from_slice(&[1600, 1000, 1800, 1000]);
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_relative_eq!(translator.throttle(), 0.7, epsilon = 1e-6);

        pwm[..4].copy_from_slice(&[1000; 4]);
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(translator.throttle(), 0.0);
    }

    #[test]
    fn test_plane_forward_then_hover() {
        let mut translator = ActuatorTranslator::new(VehicleType::Plane);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &ActuatorSettings::default());

        pwm[2] = 1750;
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_relative_eq!(translator.throttle(), 0.75, epsilon = 1e-6);

        // No forward thrust: fall back to lift motors on 4..8.
        pwm[2] = 1000;
        pwm[4..8].copy_from_slice(&[1400, 1400, 1400, 1400]);
        translator
            .build(
                &mut pwm,
                true,
                WindDescriptor::default(),
                &OverrideTable::new(),
                ChannelMask::from_bits(0b1111_0000),
                &ActuatorSettings::default(),
            )
            .unwrap();
        assert_relative_eq!(translator.throttle(), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_rover_throttle_and_clamping() {
        let mut translator = ActuatorTranslator::new(VehicleType::Rover);
        let mut pwm = [PWM_NEUTRAL; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &ActuatorSettings::default());

        pwm[2] = 2000;
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_relative_eq!(translator.throttle(), 1.0, epsilon = 1e-6);

        pwm[0] = 2400;
        pwm[2] = 1250;
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_relative_eq!(translator.throttle(), 0.5, epsilon = 1e-6);
        assert_eq!(input.servos[0], PWM_MAX);

        pwm[2] = 800;
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(input.servos[2], PWM_MIN);
        assert_relative_eq!(translator.throttle(), 1.0, epsilon = 1e-6);

        pwm[2] = PWM_INACTIVE;
        build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(translator.throttle(), 0.0);
    }

    #[test]
    fn test_engine_failure_drives_to_neutral() {
        let settings = ActuatorSettings {
            engine_mul: 0.0,
            engine_fail: ChannelMask::from_bits(0b0100),
            ..Default::default()
        };

        let mut copter = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut copter, &mut pwm, &settings);
        pwm[2] = 1800;
        let input = build(&mut copter, &mut pwm, &settings);
        assert_eq!(input.servos[2], PWM_MIN);

        let mut rover = ActuatorTranslator::new(VehicleType::Rover);
        let mut pwm = [PWM_NEUTRAL; NUM_CHANNELS];
        build(&mut rover, &mut pwm, &settings);
        pwm[2] = 1900;
        let input = build(&mut rover, &mut pwm, &settings);
        assert_eq!(input.servos[2], PWM_NEUTRAL);
    }

    #[test]
    fn test_engine_failure_partial() {
        let settings = ActuatorSettings {
            engine_mul: 0.5,
            engine_fail: ChannelMask::from_bits(0b0001),
            ..Default::default()
        };
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        build(&mut translator, &mut pwm, &settings);
        pwm[0] = 1800;
        let input = build(&mut translator, &mut pwm, &settings);
        assert_eq!(input.servos[0], 1400);
    }

    #[test]
    fn test_overrides_replace_flagged_channels() {
        let settings = ActuatorSettings {
            override_mask: ChannelMask::from_bits(0b0011),
            ..Default::default()
        };
        let mut overrides = OverrideTable::new();
        let mut values = [f32::NAN; NUM_CHANNELS];
        values[0] = 1234.0;
        values[2] = 1777.0;
        overrides.apply(&values);

        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [1600; NUM_CHANNELS];
        let input = translator
            .build(&mut pwm, true, WindDescriptor::default(), &overrides, QUAD, &settings)
            .unwrap();
        assert_eq!(input.servos[0], 1234);
        // flagged but never received
        assert_eq!(input.servos[1], 0);
        // received but not flagged
        assert_eq!(input.servos[2], PWM_MIN);
    }

    #[test]
    fn test_peripheral_transform_applied() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        translator.add_peripheral(Box::new(FixedEsc { channel: 3, value: 1300 }));
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        let input = build(&mut translator, &mut pwm, &ActuatorSettings::default());
        assert_eq!(input.servos[3], 1300);
    }

    #[test]
    fn test_peripheral_invalid_value_is_fatal() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        translator.add_peripheral(Box::new(FixedEsc { channel: 1, value: 900 }));
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        let err = translator
            .build(
                &mut pwm,
                true,
                WindDescriptor::default(),
                &OverrideTable::new(),
                QUAD,
                &ActuatorSettings::default(),
            )
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SitlError::InvalidActuatorValue { channel: 1, value: 900, .. }
        ));
    }

    #[test]
    fn test_peripheral_zero_is_allowed() {
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        translator.add_peripheral(Box::new(FixedEsc { channel: 1, value: 0 }));
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        assert!(translator
            .build(
                &mut pwm,
                true,
                WindDescriptor::default(),
                &OverrideTable::new(),
                QUAD,
                &ActuatorSettings::default(),
            )
            .is_ok());
    }

    #[test]
    fn test_wind_attached() {
        let wind = WindDescriptor {
            speed: 3.0,
            direction: 45.0,
            turbulence: 0.2,
            dir_z: 1.0,
        };
        let mut translator = ActuatorTranslator::new(VehicleType::Copter);
        let mut pwm = [PWM_MIN; NUM_CHANNELS];
        let input = translator
            .build(&mut pwm, true, wind, &OverrideTable::new(), QUAD, &ActuatorSettings::default())
            .unwrap();
        assert_eq!(input.wind, wind);
    }

    #[test]
    fn test_settings_from_params() {
        let mut params = ParamStore::new();
        params.apply_default("SIM_ENGINE_FAIL=5").unwrap();
        params.apply_default("SIM_ENGINE_MUL=0.25").unwrap();
        params.apply_default("SIM_CAN_SRV_MSK=3").unwrap();
        let settings = ActuatorSettings::from_params(&params);
        assert_eq!(settings.engine_mul, 0.25);
        assert_eq!(settings.engine_fail.bits(), 5);
        assert_eq!(settings.override_mask.bits(), 3);
    }
}
