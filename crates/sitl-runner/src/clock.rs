//! Clock synchronization.
//!
//! Firmware code that needs to wait for simulated time calls
//! [`ClockSync::wait_until`]. On the thread that owns the clock, waiting
//! means stepping the physics until the target is reached. Any other thread
//! sleeps in short intervals and lets the owner do the stepping.
//!
//! When running faster than real time, the owner also holds the clock back
//! while the serial 0 output queue is backed up, so a ground station reading
//! that port never falls behind simulated time.

use crate::error::Result;
use crate::model::OutboundQueue;
use serde::{Deserialize, Serialize};
use sitl_metrics::{metric_defs, InstanceLabels};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::trace;

/// Speedup above which a background task yields instead of sleeping.
const YIELD_SPEEDUP: f64 = 2.0;

// ============================================================================
// Configuration
// ============================================================================

/// Wait loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Queue depth at which the clock owner stops advancing time.
    pub backpressure_threshold: usize,
    /// Sleep between checks when a non-owner thread waits, in µs.
    pub wait_sleep_us: u64,
    /// Sleep between queue checks while backpressured, in µs.
    pub backpressure_sleep_us: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            backpressure_threshold: 1024,
            wait_sleep_us: 1000,
            backpressure_sleep_us: 1000,
        }
    }
}

// ============================================================================
// Driver Interface
// ============================================================================

/// What the wait loop needs from the simulation.
pub trait ClockDriver {
    /// Current virtual time in µs.
    fn now_us(&self) -> u64;

    /// Whether the caller owns the clock.
    fn in_main_thread(&self) -> bool;

    /// Legacy mode in which any waiting thread steps the physics.
    fn semaphore_wait_hack(&self) -> bool;

    /// Run one physics step.
    fn step(&self) -> Result<()>;

    /// Current speedup factor of the model.
    fn speedup(&self) -> f64;

    /// Whether the caller is a background task allowed to yield rather than
    /// sleep when running fast.
    fn may_yield(&self) -> bool {
        false
    }
}

// ============================================================================
// Clock Sync
// ============================================================================

/// Blocking wait on the virtual clock with output backpressure.
#[derive(Debug)]
pub struct ClockSync {
    config: ClockConfig,
    labels: InstanceLabels,
    outqueue_full_count: AtomicU64,
}

impl ClockSync {
    /// Create a wait loop.
    pub fn new(config: ClockConfig, labels: InstanceLabels) -> Self {
        ClockSync {
            config,
            labels,
            outqueue_full_count: AtomicU64::new(0),
        }
    }

    /// Loop configuration.
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Backpressure iterations so far.
    pub fn serial0_outqueue_full_count(&self) -> u64 {
        self.outqueue_full_count.load(Ordering::Relaxed)
    }

    /// Block until virtual time reaches `target_us`.
    ///
    /// The clock owner steps the physics once per iteration. Other threads
    /// sleep, or yield when they are a fast-running background task. Once
    /// the target is reached, the owner waits while `serial0` holds at least
    /// the backpressure threshold of unsent bytes, if the model runs faster
    /// than real time.
    pub fn wait_until(
        &self,
        target_us: u64,
        driver: &dyn ClockDriver,
        serial0: Option<&dyn OutboundQueue>,
    ) -> Result<()> {
        // slow models sleep as if running in real time
        let speedup = driver.speedup().max(1.0);

        while driver.now_us() < target_us {
            if driver.in_main_thread() || driver.semaphore_wait_hack() {
                driver.step()?;
            } else if speedup > YIELD_SPEEDUP && driver.may_yield() {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_micros(self.config.wait_sleep_us));
            }
        }

        if speedup > 1.0 && driver.in_main_thread() {
            if let Some(queue) = serial0 {
                self.drain_backpressure(queue);
            }
        }
        Ok(())
    }

    fn drain_backpressure(&self, queue: &dyn OutboundQueue) {
        loop {
            let queue_length = queue.queue_length();
            if queue_length < self.config.backpressure_threshold {
                break;
            }
            trace!(queue_length, "serial0 output queue full");
            self.outqueue_full_count.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(metric_defs::SERIAL0_OUTQUEUE_FULL.name, &self.labels.to_labels())
                .increment(1);
            queue.service();
            thread::sleep(Duration::from_micros(self.config.backpressure_sleep_us));
        }
    }
}
