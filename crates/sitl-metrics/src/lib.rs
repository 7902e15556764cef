//! Metrics declarations for the SITL bridge.
//!
//! All metrics are declared as [`Metric`] constants in [`metric_defs`] so
//! names are never spelled twice. Every metric carries the [`InstanceLabels`]
//! of the simulator process that emitted it.
//!
//! ```rust
//! use sitl_metrics::{metric_defs, InstanceLabels};
//!
//! let labels = InstanceLabels::new(0, "copter");
//! sitl_metrics::metrics::counter!(metric_defs::STEP_TICKS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use sitl_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const SENT: Metric = Metric::counter("sitl.example.sent")
///     .with_description("Datagrams sent")
///     .with_unit(Unit::Count);
///
/// assert_eq!(SENT.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name.
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
}

impl Metric {
    /// Creates a new counter metric.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
        }
    }

    /// Creates a new gauge metric.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
        }
    }

    /// Creates a new histogram metric.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }

    /// Returns the unit as a human-readable string.
    pub fn unit_str(&self) -> &'static str {
        match self.unit {
            Some(Unit::Count) => "count",
            Some(Unit::Percent) => "percent",
            Some(Unit::Seconds) => "seconds",
            Some(Unit::Milliseconds) => "milliseconds",
            Some(Unit::Microseconds) => "microseconds",
            Some(Unit::Bytes) => "bytes",
            Some(_) => "other",
            None => "",
        }
    }
}

/// Labels attached to every metric emitted by a simulator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLabels {
    /// Simulator instance number.
    pub instance: u16,
    /// Vehicle type name.
    pub vehicle: &'static str,
}

impl InstanceLabels {
    /// Create labels for an instance.
    pub fn new(instance: u16, vehicle: &'static str) -> Self {
        Self { instance, vehicle }
    }

    /// Convert to label pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("instance", self.instance.to_string()),
            ("vehicle", self.vehicle.to_string()),
        ]
    }
}

/// All metric definitions for the bridge.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Step Driver
    // ========================================================================

    /// Physics steps completed.
    pub const STEP_TICKS: Metric = Metric::counter("sitl.step.ticks")
        .with_description("Physics steps completed")
        .with_unit(Unit::Count);

    /// Wall-clock duration of each physics step.
    pub const STEP_DURATION: Metric = Metric::histogram("sitl.step.duration_us")
        .with_description("Wall-clock duration of each physics step")
        .with_unit(Unit::Microseconds);

    // ========================================================================
    // Multicast
    // ========================================================================

    /// State datagrams published.
    pub const MULTICAST_STATE_SENT: Metric = Metric::counter("sitl.multicast.state_sent")
        .with_description("State datagrams published to the multicast group")
        .with_unit(Unit::Count);

    /// Override datagrams accepted.
    pub const MULTICAST_OVERRIDE_PACKETS: Metric =
        Metric::counter("sitl.multicast.override_packets")
            .with_description("Servo override datagrams received from peers")
            .with_unit(Unit::Count);

    // ========================================================================
    // Clock
    // ========================================================================

    /// Backpressure iterations spent waiting on the serial 0 queue.
    pub const SERIAL0_OUTQUEUE_FULL: Metric = Metric::counter("sitl.serial0.outqueue_full")
        .with_description("Clock waits delayed because the serial 0 output queue was full")
        .with_unit(Unit::Count);

    // ========================================================================
    // Vehicle
    // ========================================================================

    /// Aggregate throttle estimate.
    pub const ACTUATOR_THROTTLE: Metric = Metric::gauge("sitl.actuator.throttle")
        .with_description("Aggregate throttle estimate in [0, 1]");

    /// Active wind speed.
    pub const WIND_SPEED: Metric = Metric::gauge("sitl.wind.speed")
        .with_description("Active wind speed after slew and altitude profile in m/s");

    /// Height above ground.
    pub const HEIGHT_AGL: Metric = Metric::gauge("sitl.height_agl")
        .with_description("Height above ground level in meters");

    /// All metrics, for bulk registration.
    pub const ALL: &[Metric] = &[
        STEP_TICKS,
        STEP_DURATION,
        MULTICAST_STATE_SENT,
        MULTICAST_OVERRIDE_PACKETS,
        SERIAL0_OUTQUEUE_FULL,
        ACTUATOR_THROTTLE,
        WIND_SPEED,
        HEIGHT_AGL,
    ];
}

/// Describe all metrics with the installed recorder.
///
/// Call once at startup, after a recorder has been installed.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
