//! The simulation context shared by the firmware threads.

use crate::clock::{ClockConfig, ClockDriver, ClockSync};
use crate::error::Result;
use crate::metrics_export::MetricsSnapshot;
use crate::model::{OutboundQueue, SensorFeed};
use crate::outputs::ServoOutputs;
use crate::scheduler::Scheduler;
use crate::step::StepDriver;
use crate::supervisor::ParentWatch;
use crate::watchdog::{CurrentStepInfo, WatchdogState};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sitl_common::SimulatedState;
use sitl_metrics::InstanceLabels;
use sitl_params::ParamStore;
use std::sync::Arc;
use tracing::info;

/// Counters reported when a run ends.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStats {
    /// Virtual time reached, in seconds.
    pub sim_time_s: f64,
    /// Physics steps completed.
    pub steps: u64,
    /// Clock waits delayed by serial 0 backpressure.
    pub serial0_outqueue_full_count: u64,
    /// State datagrams published.
    pub multicast_states_sent: u64,
    /// Override datagrams accepted.
    pub multicast_override_packets: u64,
    /// Frames sent to the FlightGear viewer.
    pub flightgear_frames_sent: u64,
    /// Latched home altitude.
    pub home_alt: Option<f64>,
    /// Last aggregate throttle estimate.
    pub throttle: f32,
    /// Last state.
    pub state: SimulatedState,
    /// Recorded metrics, when a recorder was installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

/// Owns the step driver and the virtual clock.
///
/// Firmware threads share one `Simulation`. The thread that created the
/// [`Scheduler`] drives time forward through [`wait_until`](Self::wait_until);
/// every other thread only waits.
pub struct Simulation {
    scheduler: Arc<Scheduler>,
    driver: Mutex<StepDriver>,
    outputs: Arc<ServoOutputs>,
    params: Arc<RwLock<ParamStore>>,
    parent: ParentWatch,
    sensors: Mutex<Option<Box<dyn SensorFeed>>>,
    clock: ClockSync,
    serial0: Option<Arc<dyn OutboundQueue>>,
    watchdog: Option<Arc<WatchdogState>>,
}

impl Simulation {
    /// Create a simulation around a step driver.
    ///
    /// Captures the parent process so its exit can be detected.
    pub fn new(
        scheduler: Arc<Scheduler>,
        driver: StepDriver,
        params: Arc<RwLock<ParamStore>>,
        clock: ClockConfig,
        labels: InstanceLabels,
    ) -> Self {
        Simulation {
            scheduler,
            driver: Mutex::new(driver),
            outputs: Arc::new(ServoOutputs::new()),
            params,
            parent: ParentWatch::capture(),
            sensors: Mutex::new(None),
            clock: ClockSync::new(clock, labels),
            serial0: None,
            watchdog: None,
        }
    }

    /// Use an explicit parent watch instead of the captured parent.
    pub fn with_parent_watch(mut self, parent: ParentWatch) -> Self {
        self.parent = parent;
        self
    }

    /// Feed sensors after each step.
    pub fn with_sensors(self, sensors: Box<dyn SensorFeed>) -> Self {
        *self.sensors.lock() = Some(sensors);
        self
    }

    /// Apply clock backpressure from this serial 0 queue.
    pub fn with_serial0(mut self, serial0: Arc<dyn OutboundQueue>) -> Self {
        self.serial0 = Some(serial0);
        self
    }

    /// Report each step to a watchdog.
    pub fn with_watchdog(mut self, watchdog: Arc<WatchdogState>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Virtual clock and timers.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Servo output table the firmware writes to.
    pub fn outputs(&self) -> &Arc<ServoOutputs> {
        &self.outputs
    }

    /// Parameter store.
    pub fn params(&self) -> &Arc<RwLock<ParamStore>> {
        &self.params
    }

    /// State after the last step.
    pub fn state(&self) -> SimulatedState {
        *self.driver.lock().state()
    }

    /// Run one physics step and then the timers.
    pub fn step(&self) -> Result<()> {
        let (update_count, state) = {
            let _section = self.scheduler.begin_atomic();
            let mut driver = self.driver.lock();
            if let Some(watchdog) = &self.watchdog {
                watchdog.set_current_step(Some(CurrentStepInfo::starting(
                    driver.update_count() + 1,
                    self.scheduler.now(),
                )));
            }
            let result = driver.step(&self.scheduler, &self.outputs, &self.params.read());
            if let Some(watchdog) = &self.watchdog {
                watchdog.set_current_step(None);
            }
            result?;
            (driver.update_count(), *driver.state())
        };

        self.parent.check()?;

        if self.scheduler.interrupts_blocked() {
            return Ok(());
        }

        if update_count > 1 {
            let _section = self.scheduler.begin_atomic();
            if let Some(sensors) = self.sensors.lock().as_mut() {
                sensors.update(&state);
            }
        }

        self.scheduler.timer_event();
        Ok(())
    }

    /// Block until virtual time reaches `target_us`.
    pub fn wait_until(&self, target_us: u64) -> Result<()> {
        self.clock.wait_until(target_us, self, self.serial0.as_deref())
    }

    /// Wait for `delay_us` of virtual time.
    pub fn delay_us(&self, delay_us: u64) -> Result<()> {
        self.wait_until(self.scheduler.micros64().saturating_add(delay_us))
    }

    /// Counters for the run so far.
    pub fn stats(&self) -> SimulationStats {
        let driver = self.driver.lock();
        SimulationStats {
            sim_time_s: self.scheduler.now().as_secs_f64(),
            steps: driver.update_count(),
            serial0_outqueue_full_count: self.clock.serial0_outqueue_full_count(),
            multicast_states_sent: driver.multicast().map_or(0, |m| m.states_sent()),
            multicast_override_packets: driver.multicast().map_or(0, |m| m.override_packets()),
            flightgear_frames_sent: driver.flightgear().map_or(0, |f| f.frames_sent()),
            home_alt: driver.home_alt(),
            throttle: driver.throttle(),
            state: *driver.state(),
            metrics: None,
        }
    }

    /// Log the end-of-run summary.
    pub fn log_summary(&self) {
        let stats = self.stats();
        info!(
            sim_time_s = stats.sim_time_s,
            steps = stats.steps,
            serial0_outqueue_full = stats.serial0_outqueue_full_count,
            states_sent = stats.multicast_states_sent,
            "simulation finished"
        );
    }
}

impl ClockDriver for Simulation {
    fn now_us(&self) -> u64 {
        self.scheduler.micros64()
    }

    fn in_main_thread(&self) -> bool {
        self.scheduler.in_main_thread()
    }

    fn semaphore_wait_hack(&self) -> bool {
        self.scheduler.semaphore_wait_hack()
    }

    fn step(&self) -> Result<()> {
        Simulation::step(self)
    }

    fn speedup(&self) -> f64 {
        self.driver.lock().speedup()
    }

    fn may_yield(&self) -> bool {
        self.scheduler.in_background_thread() && self.scheduler.is_armed()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("scheduler", &self.scheduler)
            .field("parent", &self.parent)
            .field("serial0", &self.serial0.is_some())
            .finish()
    }
}
