//! Wall-clock pacing for models that run in-process.
//!
//! An external flight dynamics model normally paces itself. The built-in
//! demo model has no such notion, so it uses a [`RealTimePacer`] to keep
//! simulated time at the configured multiple of wall-clock time.
//!
//! ## Features
//!
//! - **Speedup**: run faster or slower than real time
//! - **Lag detection**: warn when the simulation falls behind
//! - **Periodic stats**: sim/real ratio, step rates and resident memory

use serde::{Deserialize, Serialize};
use sitl_common::SimTime;
use std::time::{Duration, Instant};

/// Configuration for real-time pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealTimeConfig {
    /// Ratio of simulated to wall-clock time. Values <= 0 disable pacing.
    pub speedup: f64,

    /// Lag beyond which a warning is issued, in milliseconds.
    pub max_lag_ms: u64,

    /// Minimum interval between lag warnings, in milliseconds.
    pub lag_warn_interval_ms: u64,

    /// Interval for periodic stats output in seconds. `None` disables them.
    pub periodic_stats_interval_secs: Option<u64>,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        RealTimeConfig {
            speedup: 1.0,
            max_lag_ms: 100,
            lag_warn_interval_ms: 5000,
            periodic_stats_interval_secs: Some(10),
        }
    }
}

impl RealTimeConfig {
    /// Pace at the given speedup.
    pub fn with_speedup(speedup: f64) -> Self {
        RealTimeConfig {
            speedup,
            ..Default::default()
        }
    }

    /// Run as fast as possible.
    pub fn unpaced() -> Self {
        RealTimeConfig {
            speedup: 0.0,
            ..Default::default()
        }
    }

    /// Set the periodic stats interval.
    pub fn with_periodic_stats_interval(mut self, interval_secs: Option<u64>) -> Self {
        self.periodic_stats_interval_secs = interval_secs;
        self
    }

    /// Whether pacing is active.
    pub fn enabled(&self) -> bool {
        self.speedup > 0.0
    }
}

/// Tracks simulated time against wall-clock time.
#[derive(Debug)]
pub struct RealTimePacer {
    config: RealTimeConfig,
    start_wall: Instant,
    start_sim: SimTime,
    last_lag_warn: Instant,
    total_lag_warnings: u64,
    max_lag_seen_ms: i64,
    last_periodic_stats: Instant,
    last_periodic_step_count: u64,
}

impl RealTimePacer {
    /// Start pacing from `start_sim`.
    pub fn new(config: RealTimeConfig, start_sim: SimTime) -> Self {
        let now = Instant::now();
        RealTimePacer {
            config,
            start_wall: now,
            start_sim,
            last_lag_warn: now,
            total_lag_warnings: 0,
            max_lag_seen_ms: 0,
            last_periodic_stats: now,
            last_periodic_step_count: 0,
        }
    }

    /// Pacing configuration.
    pub fn config(&self) -> &RealTimeConfig {
        &self.config
    }

    /// Simulated time that should have been reached by now.
    pub fn target_sim_time(&self) -> SimTime {
        let scaled = (self.start_wall.elapsed().as_micros() as f64 * self.config.speedup) as u64;
        self.start_sim + SimTime::from_micros(scaled)
    }

    /// Lag behind the target in microseconds. Negative when ahead.
    pub fn lag_us(&self, sim_time: SimTime) -> i64 {
        self.target_sim_time().as_micros() as i64 - sim_time.as_micros() as i64
    }

    /// How long to sleep before `sim_time` is due. `None` if already due.
    pub fn sleep_until(&self, sim_time: SimTime) -> Option<Duration> {
        if !self.config.enabled() {
            return None;
        }
        let offset_us = sim_time.since(self.start_sim).as_micros();
        let due = self.start_wall + Duration::from_micros((offset_us as f64 / self.config.speedup) as u64);
        due.checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    /// Returns the lag in milliseconds if it is large enough to warn about
    /// and the last warning was long enough ago.
    pub fn check_lag_warning(&mut self, sim_time: SimTime) -> Option<i64> {
        if !self.config.enabled() {
            return None;
        }
        let lag_ms = self.lag_us(sim_time) / 1000;
        self.max_lag_seen_ms = self.max_lag_seen_ms.max(lag_ms);

        if lag_ms > self.config.max_lag_ms as i64 {
            let now = Instant::now();
            if now.duration_since(self.last_lag_warn).as_millis() >= self.config.lag_warn_interval_ms as u128 {
                self.last_lag_warn = now;
                self.total_lag_warnings += 1;
                return Some(lag_ms);
            }
        }
        None
    }

    /// Returns stats if the periodic interval has elapsed.
    pub fn check_periodic_stats(&mut self, sim_time: SimTime, total_steps: u64) -> Option<PeriodicStats> {
        let interval_secs = self.config.periodic_stats_interval_secs?;

        let now = Instant::now();
        let since_last = now.duration_since(self.last_periodic_stats);
        if since_last.as_secs() < interval_secs {
            return None;
        }

        let wall_elapsed = self.start_wall.elapsed();
        let sim_elapsed = sim_time.since(self.start_sim).as_secs_f64();
        let sim_to_realtime_ratio = if wall_elapsed.as_secs_f64() > 0.0 {
            sim_elapsed / wall_elapsed.as_secs_f64()
        } else {
            0.0
        };

        let steps = total_steps.saturating_sub(self.last_periodic_step_count);
        let step_rate_real = steps as f64 / since_last.as_secs_f64();
        let step_rate_sim = if sim_to_realtime_ratio > 0.0 {
            step_rate_real / sim_to_realtime_ratio
        } else {
            0.0
        };

        let memory_bytes = memory_stats::memory_stats()
            .map(|stats| stats.physical_mem)
            .unwrap_or(0);

        self.last_periodic_stats = now;
        self.last_periodic_step_count = total_steps;

        Some(PeriodicStats {
            sim_time,
            wall_elapsed,
            sim_to_realtime_ratio,
            total_steps,
            step_rate_real,
            step_rate_sim,
            memory_bytes,
        })
    }

    /// Summary of the pacing session.
    pub fn stats(&self) -> RealTimePacerStats {
        RealTimePacerStats {
            elapsed_wall: self.start_wall.elapsed(),
            total_lag_warnings: self.total_lag_warnings,
            max_lag_seen_ms: self.max_lag_seen_ms,
            speedup: self.config.speedup,
        }
    }
}

/// Summary of a pacing session.
#[derive(Debug, Clone, Serialize)]
pub struct RealTimePacerStats {
    /// Wall-clock time elapsed.
    pub elapsed_wall: Duration,
    /// Lag warnings issued.
    pub total_lag_warnings: u64,
    /// Largest lag seen in milliseconds.
    pub max_lag_seen_ms: i64,
    /// Configured speedup.
    pub speedup: f64,
}

/// Periodic statistics.
#[derive(Debug, Clone)]
pub struct PeriodicStats {
    /// Current simulated time.
    pub sim_time: SimTime,
    /// Wall-clock time since pacing started.
    pub wall_elapsed: Duration,
    /// Simulated seconds per wall-clock second.
    pub sim_to_realtime_ratio: f64,
    /// Steps completed.
    pub total_steps: u64,
    /// Steps per wall-clock second over the last interval.
    pub step_rate_real: f64,
    /// Steps per simulated second over the last interval.
    pub step_rate_sim: f64,
    /// Resident memory in bytes.
    pub memory_bytes: usize,
}

impl PeriodicStats {
    /// Memory size in a fixed-width human-readable form.
    pub fn memory_human_readable(&self) -> String {
        let bytes = self.memory_bytes as f64;
        if bytes >= 1_073_741_824.0 {
            format!("{:>7.2} GB", bytes / 1_073_741_824.0)
        } else if bytes >= 1_048_576.0 {
            format!("{:>7.2} MB", bytes / 1_048_576.0)
        } else if bytes >= 1024.0 {
            format!("{:>7.2} KB", bytes / 1024.0)
        } else {
            format!("{:>7} B ", self.memory_bytes)
        }
    }
}
