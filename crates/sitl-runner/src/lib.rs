//! # sitl-runner library
//!
//! Simulation clock and IO bridge for running flight firmware against a
//! simulated vehicle.
//!
//! The firmware under test never sees a wall clock. Each physics step turns
//! its servo outputs into actuator inputs, advances the flight dynamics
//! model, publishes the new state and then moves the virtual clock to the
//! state's timestamp. Firmware threads wait on that clock through
//! [`Simulation::wait_until`].
//!
//! ## Step Pipeline
//!
//! - [`wind`]: ramped, low-pass filtered wind with a height profile
//! - [`actuators`]: servo outputs to model input, overrides and failure injection
//! - [`model`]: the flight model and other collaborators behind traits
//! - [`multicast`]: state publication and servo override reception
//! - [`height`]: height above ground from the home altitude or terrain
//! - [`flightgear`]: optional FlightGear viewer output
//!
//! ## Clock
//!
//! - [`scheduler`]: virtual time, atomic sections and timer procedures
//! - [`clock`]: stepping, sleeping and serial 0 backpressure while waiting
//! - [`supervisor`]: exit when the launching process goes away
//! - [`watchdog`]: warn when a single step takes too long
//! - [`metrics_export`]: in-memory recorder behind the run summary

pub mod actuators;
pub mod clock;
pub mod config;
pub mod error;
pub mod flightgear;
pub mod height;
pub mod hover;
pub mod metrics_export;
pub mod model;
pub mod multicast;
pub mod outputs;
pub mod realtime;
pub mod scheduler;
pub mod serial_bridge;
pub mod simulation;
pub mod step;
pub mod supervisor;
pub mod watchdog;
pub mod wind;

pub use actuators::{ActuatorSettings, ActuatorTranslator, PeripheralSim};
pub use clock::{ClockConfig, ClockDriver, ClockSync};
pub use config::SitlConfig;
pub use error::{Result, SitlError};
pub use flightgear::FlightGearView;
pub use height::HeightAgl;
pub use hover::{HomeLocation, HoverConfig, HoverModel, MAX_RATE_HZ};
pub use metrics_export::{HistogramSummary, InMemoryRecorder, MetricsSnapshot};
pub use model::{FlightModel, OutboundQueue, RideAlong, SensorFeed, TerrainProvider};
pub use multicast::{MulticastChannel, MulticastConfig, OverrideTable};
pub use outputs::ServoOutputs;
pub use realtime::{PeriodicStats, RealTimeConfig, RealTimePacer, RealTimePacerStats};
pub use scheduler::{AtomicSection, Scheduler, TimerProc};
pub use serial_bridge::Serial0Bridge;
pub use simulation::{Simulation, SimulationStats};
pub use sitl_common::{SimTime, SimulatedState, VehicleType};
pub use step::StepDriver;
pub use supervisor::ParentWatch;
pub use watchdog::{CurrentStepInfo, StepWatchdog, WatchdogState};
pub use wind::{WindModel, WindProfile, WindSettings};
