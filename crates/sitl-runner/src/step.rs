//! One physics tick.
//!
//! [`StepDriver`] owns every piece of per-process simulation state (wind
//! filter, actuator translator, override table, home altitude) together with
//! the flight dynamics model and the optional collaborators. The
//! [`Simulation`](crate::Simulation) holds it behind a single lock so no two
//! steps ever overlap.

use crate::actuators::{ActuatorSettings, ActuatorTranslator, PeripheralSim};
use crate::error::Result;
use crate::flightgear::FlightGearView;
use crate::height::HeightAgl;
use crate::model::{FlightModel, RideAlong, TerrainProvider};
use crate::multicast::{MulticastChannel, OverrideTable};
use crate::outputs::ServoOutputs;
use crate::scheduler::Scheduler;
use crate::wind::{WindModel, WindSettings};
use sitl_common::{SimulatedState, VehicleType};
use sitl_metrics::{metric_defs, InstanceLabels};
use sitl_params::{ParamStore, SIM_TERRAIN};
use std::time::Instant;
use tracing::trace;

/// Runs one simulation tick at a time.
pub struct StepDriver {
    vehicle: VehicleType,
    wind: WindModel,
    translator: ActuatorTranslator,
    multicast: Option<MulticastChannel>,
    no_overrides: OverrideTable,
    height: HeightAgl,
    model: Box<dyn FlightModel>,
    terrain: Option<Box<dyn TerrainProvider>>,
    ride_along: Option<Box<dyn RideAlong>>,
    flightgear: Option<FlightGearView>,
    state: SimulatedState,
    update_count: u64,
    labels: InstanceLabels,
}

impl StepDriver {
    /// Create a driver for a vehicle and its flight dynamics model.
    pub fn new(vehicle: VehicleType, model: Box<dyn FlightModel>, labels: InstanceLabels) -> Self {
        StepDriver {
            vehicle,
            wind: WindModel::new(),
            translator: ActuatorTranslator::new(vehicle),
            multicast: None,
            no_overrides: OverrideTable::new(),
            height: HeightAgl::new(),
            model,
            terrain: None,
            ride_along: None,
            flightgear: None,
            state: SimulatedState::default(),
            update_count: 0,
            labels,
        }
    }

    /// Publish state to, and take overrides from, a multicast group.
    pub fn with_multicast(mut self, channel: MulticastChannel) -> Self {
        self.multicast = Some(channel);
        self
    }

    /// Use a terrain service for height above ground.
    pub fn with_terrain(mut self, terrain: Box<dyn TerrainProvider>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    /// Attach a ride-along controller.
    pub fn with_ride_along(mut self, ride_along: Box<dyn RideAlong>) -> Self {
        self.ride_along = Some(ride_along);
        self
    }

    /// Export each state to a FlightGear viewer.
    pub fn with_flightgear(mut self, view: FlightGearView) -> Self {
        self.flightgear = Some(view);
        self
    }

    /// Attach a peripheral simulator.
    pub fn with_peripheral(mut self, peripheral: Box<dyn PeripheralSim>) -> Self {
        self.translator.add_peripheral(peripheral);
        self
    }

    /// Vehicle type.
    pub fn vehicle(&self) -> VehicleType {
        self.vehicle
    }

    /// State after the last step.
    pub fn state(&self) -> &SimulatedState {
        &self.state
    }

    /// Steps completed.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Throttle estimate from the last step.
    pub fn throttle(&self) -> f32 {
        self.translator.throttle()
    }

    /// Latched home altitude.
    pub fn home_alt(&self) -> Option<f64> {
        self.height.home_alt()
    }

    /// Multicast channel, if configured.
    pub fn multicast(&self) -> Option<&MulticastChannel> {
        self.multicast.as_ref()
    }

    /// FlightGear viewer, if configured.
    pub fn flightgear(&self) -> Option<&FlightGearView> {
        self.flightgear.as_ref()
    }

    /// Speedup factor reported by the model.
    pub fn speedup(&self) -> f64 {
        self.model.speedup()
    }

    /// Run one tick: build the input, advance the model, publish the new
    /// state, then move the clock to the state's timestamp.
    pub fn step(
        &mut self,
        scheduler: &Scheduler,
        outputs: &ServoOutputs,
        params: &ParamStore,
    ) -> Result<()> {
        let started = Instant::now();
        let now = scheduler.now();

        let wind = self
            .wind
            .advance(now, self.state.height_agl, &WindSettings::from_params(params));
        let settings = ActuatorSettings::from_params(params);
        let overrides = match &self.multicast {
            Some(channel) => channel.overrides(),
            None => &self.no_overrides,
        };

        let (mut input, pwm_output) = {
            let mut pwm = outputs.lock();
            let input = self.translator.build(
                &mut pwm,
                outputs.output_ready(),
                wind,
                overrides,
                self.state.motor_mask,
                &settings,
            )?;
            (input, *pwm)
        };

        if let Some(ride_along) = self.ride_along.as_mut() {
            ride_along.receive(&mut input);
        }

        let mut state = self.model.update(&input);
        // peers see the height from the previous tick until it is recomputed below
        state.height_agl = self.state.height_agl;

        if let Some(channel) = self.multicast.as_mut() {
            channel.publish(&state)?;
            channel.drain_overrides()?;
        }

        if let Some(ride_along) = self.ride_along.as_mut() {
            ride_along.send(&state);
        }

        if let Some(view) = self.flightgear.as_mut() {
            view.send(&state, self.vehicle, &pwm_output);
        }

        scheduler.stop_clock(state.timestamp_us);

        state.height_agl = self.height.update(
            &state,
            self.terrain.as_deref(),
            params.get(&SIM_TERRAIN),
        );
        self.state = state;
        self.update_count += 1;

        let labels = self.labels.to_labels();
        metrics::counter!(metric_defs::STEP_TICKS.name, &labels).increment(1);
        metrics::histogram!(metric_defs::STEP_DURATION.name, &labels)
            .record(started.elapsed().as_micros() as f64);
        metrics::gauge!(metric_defs::ACTUATOR_THROTTLE.name, &labels)
            .set(self.translator.throttle() as f64);
        metrics::gauge!(metric_defs::WIND_SPEED.name, &labels).set(wind.speed as f64);
        metrics::gauge!(metric_defs::HEIGHT_AGL.name, &labels).set(state.height_agl as f64);

        trace!(
            tick = self.update_count,
            time_us = state.timestamp_us,
            agl = state.height_agl,
            "physics step"
        );
        Ok(())
    }
}

impl std::fmt::Debug for StepDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDriver")
            .field("vehicle", &self.vehicle)
            .field("update_count", &self.update_count)
            .field("multicast", &self.multicast)
            .field("terrain", &self.terrain.is_some())
            .field("ride_along", &self.ride_along.is_some())
            .field("flightgear", &self.flightgear)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitl_common::{ActuatorInput, ChannelMask};

    /// Model that climbs one meter per step and records what it was given.
    struct Recorder {
        time_us: u64,
        altitude: f64,
        inputs: std::sync::Arc<parking_lot::Mutex<Vec<ActuatorInput>>>,
    }

    impl FlightModel for Recorder {
        fn update(&mut self, input: &ActuatorInput) -> SimulatedState {
            self.inputs.lock().push(*input);
            self.time_us += 2500;
            self.altitude += 1.0;
            SimulatedState {
                timestamp_us: self.time_us,
                altitude: self.altitude,
                motor_mask: ChannelMask::from_bits(0b1111),
                ..Default::default()
            }
        }

        fn speedup(&self) -> f64 {
            1.0
        }
    }

    fn driver() -> (StepDriver, std::sync::Arc<parking_lot::Mutex<Vec<ActuatorInput>>>) {
        let inputs = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let model = Recorder {
            time_us: 0,
            altitude: 99.0,
            inputs: inputs.clone(),
        };
        let driver = StepDriver::new(
            VehicleType::Copter,
            Box::new(model),
            InstanceLabels::new(0, "copter"),
        );
        (driver, inputs)
    }

    #[test]
    fn test_step_advances_clock_and_height() {
        let (mut driver, _) = driver();
        let scheduler = Scheduler::new();
        let outputs = ServoOutputs::new();
        let params = ParamStore::new();

        driver.step(&scheduler, &outputs, &params).unwrap();
        assert_eq!(scheduler.micros64(), 2500);
        assert_eq!(driver.home_alt(), Some(100.0));
        assert_eq!(driver.state().height_agl, 0.0);

        driver.step(&scheduler, &outputs, &params).unwrap();
        assert_eq!(scheduler.micros64(), 5000);
        assert_eq!(driver.state().height_agl, 1.0);
        assert_eq!(driver.update_count(), 2);
    }

    #[test]
    fn test_step_feeds_firmware_outputs() {
        let (mut driver, inputs) = driver();
        let scheduler = Scheduler::new();
        let outputs = ServoOutputs::new();
        let params = ParamStore::new();

        // not ready: disarmed defaults
        outputs.write_outputs(0, &[1600, 1600, 1600, 1600]);
        driver.step(&scheduler, &outputs, &params).unwrap();
        assert_eq!(inputs.lock()[0].servos[0], 1000);

        outputs.write_outputs(0, &[1600, 1600, 1600, 1600]);
        outputs.set_output_ready(true);
        driver.step(&scheduler, &outputs, &params).unwrap();
        assert_eq!(inputs.lock()[1].servos[..4], [1600, 1600, 1600, 1600]);
        assert!((driver.throttle() - 0.6).abs() < 1e-6);
    }

    struct Tamper {
        received: usize,
        sent: std::sync::Arc<parking_lot::Mutex<Vec<u64>>>,
    }

    impl RideAlong for Tamper {
        fn receive(&mut self, input: &mut ActuatorInput) {
            self.received += 1;
            input.servos[7] = 1777;
        }

        fn send(&mut self, state: &SimulatedState) {
            self.sent.lock().push(state.timestamp_us);
        }
    }

    #[test]
    fn test_ride_along_sees_both_sides() {
        let (driver, inputs) = driver();
        let sent = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut driver = driver.with_ride_along(Box::new(Tamper {
            received: 0,
            sent: sent.clone(),
        }));
        let scheduler = Scheduler::new();
        driver
            .step(&scheduler, &ServoOutputs::new(), &ParamStore::new())
            .unwrap();
        assert_eq!(inputs.lock()[0].servos[7], 1777);
        assert_eq!(*sent.lock(), vec![2500]);
    }
}
