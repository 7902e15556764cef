//! Interfaces to the collaborators the bridge drives but does not implement.
//!
//! The physics model, terrain service, ride-along controller, sensor drivers
//! and the serial transport all live outside this crate. The step driver and
//! clock synchronizer only see them through these traits.

use sitl_common::{ActuatorInput, SimulatedState};

/// The flight dynamics model.
pub trait FlightModel: Send {
    /// Advance the model by one step using `input` and return the new state.
    ///
    /// The returned timestamp becomes the new virtual clock value, so it must
    /// never go backwards.
    fn update(&mut self, input: &ActuatorInput) -> SimulatedState;

    /// Ratio of simulated time to wall-clock time the model is running at.
    fn speedup(&self) -> f64;
}

/// Terrain elevation service.
pub trait TerrainProvider: Send {
    /// Terrain height above mean sea level at a location, if known.
    fn height_amsl(&self, latitude: f64, longitude: f64) -> Option<f32>;
}

/// A second controller that rides along with the firmware under test.
pub trait RideAlong: Send {
    /// Called before the model update. May overwrite any part of `input`.
    fn receive(&mut self, input: &mut ActuatorInput);

    /// Called with the new state after the model update.
    fn send(&mut self, state: &SimulatedState);
}

/// Sensor drivers fed from the simulated state after each step.
pub trait SensorFeed: Send {
    /// Push the latest state into the simulated sensors.
    fn update(&mut self, state: &SimulatedState);
}

/// The outbound side of a serial transport, used for clock backpressure.
pub trait OutboundQueue: Send + Sync {
    /// Bytes written by the firmware that have not yet left the process.
    fn queue_length(&self) -> usize;

    /// Move any pending inbound bytes into the firmware read buffer.
    fn service(&self);
}
