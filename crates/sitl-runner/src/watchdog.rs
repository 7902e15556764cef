//! Watchdog thread for monitoring slow physics steps.
//!
//! The watchdog runs in a separate thread and watches the step driver. If a
//! single step takes longer than the configured timeout, it logs what the
//! step was doing so hangs in the model or a peripheral can be diagnosed.

use parking_lot::Mutex;
use sitl_common::SimTime;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

/// Information about the step currently running.
#[derive(Debug, Clone)]
pub struct CurrentStepInfo {
    /// Step number (sequential count).
    pub step_number: u64,
    /// Virtual time when the step started.
    pub sim_time: SimTime,
    /// When the step started.
    pub started_at: Instant,
}

impl CurrentStepInfo {
    /// Info for a step starting now.
    pub fn starting(step_number: u64, sim_time: SimTime) -> Self {
        CurrentStepInfo {
            step_number,
            sim_time,
            started_at: Instant::now(),
        }
    }
}

/// Shared state between the step driver and the watchdog thread.
#[derive(Debug, Default)]
pub struct WatchdogState {
    current_step: Mutex<Option<CurrentStepInfo>>,
    stop_flag: AtomicBool,
    alert_count: AtomicU64,
}

impl WatchdogState {
    /// Create a new watchdog state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step being run, or `None` between steps.
    pub fn set_current_step(&self, info: Option<CurrentStepInfo>) {
        *self.current_step.lock() = info;
    }

    /// Get the step being run.
    pub fn current_step(&self) -> Option<CurrentStepInfo> {
        self.current_step.lock().clone()
    }

    /// Signal the watchdog to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Check if the watchdog should stop.
    pub fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Number of alerts fired.
    pub fn alert_count(&self) -> u64 {
        self.alert_count.load(Ordering::Relaxed)
    }

    fn increment_alert_count(&self) -> u64 {
        self.alert_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Watchdog thread handle.
pub struct StepWatchdog {
    state: Arc<WatchdogState>,
    thread_handle: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl StepWatchdog {
    /// Create and start a watchdog thread.
    pub fn new(timeout: Duration) -> Self {
        let state = Arc::new(WatchdogState::new());
        let watchdog_state = Arc::clone(&state);
        let check_interval = (timeout / 4).clamp(Duration::from_millis(10), Duration::from_millis(500));

        let thread_handle = thread::Builder::new()
            .name("sitl-watchdog".to_string())
            .spawn(move || {
                let mut last_alerted_step: Option<u64> = None;

                while !watchdog_state.should_stop() {
                    thread::sleep(check_interval);

                    let Some(step) = watchdog_state.current_step() else {
                        continue;
                    };
                    let elapsed = step.started_at.elapsed();

                    // once per step
                    if elapsed >= timeout && last_alerted_step != Some(step.step_number) {
                        last_alerted_step = Some(step.step_number);
                        let alert = watchdog_state.increment_alert_count();
                        warn!(
                            alert,
                            step = step.step_number,
                            sim_time = %step.sim_time,
                            elapsed_s = elapsed.as_secs_f64(),
                            "physics step taking too long"
                        );
                    }
                }
            })
            .ok();

        if thread_handle.is_none() {
            warn!("could not start step watchdog thread");
        }

        StepWatchdog {
            state,
            thread_handle,
            timeout,
        }
    }

    /// Shared state for the step driver to update.
    pub fn state(&self) -> &Arc<WatchdogState> {
        &self.state
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stop the watchdog thread and wait for it to finish.
    pub fn stop(mut self) {
        self.state.stop();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StepWatchdog {
    fn drop(&mut self) {
        self.state.stop();
    }
}

impl std::fmt::Debug for StepWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepWatchdog")
            .field("timeout", &self.timeout)
            .field("alerts", &self.state.alert_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alerts_once_per_slow_step() {
        let watchdog = StepWatchdog::new(Duration::from_millis(20));
        let state = Arc::clone(watchdog.state());

        state.set_current_step(Some(CurrentStepInfo::starting(7, SimTime::from_millis(100))));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(state.alert_count(), 1);

        state.set_current_step(None);
        watchdog.stop();
    }

    #[test]
    fn test_fast_steps_no_alert() {
        let watchdog = StepWatchdog::new(Duration::from_secs(5));
        let state = Arc::clone(watchdog.state());
        for n in 0..10 {
            state.set_current_step(Some(CurrentStepInfo::starting(n, SimTime::ZERO)));
            state.set_current_step(None);
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(state.alert_count(), 0);
        watchdog.stop();
    }
}
