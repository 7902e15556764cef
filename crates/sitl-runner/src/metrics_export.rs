//! In-memory metrics recorder.
//!
//! Collects everything emitted through the `metrics` facade so a run can
//! report its counters, gauges and step timings in the JSON summary.
//! Values carrying different labels are kept apart while recording and
//! merged by metric name in the snapshot.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Recorded metric values, merged across labels.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Counter totals by metric name.
    pub counters: BTreeMap<String, u64>,
    /// Last gauge value by metric name.
    pub gauges: BTreeMap<String, f64>,
    /// Histogram summaries by metric name.
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary statistics for a histogram metric.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramSummary {
    /// Number of samples recorded.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Mean value.
    pub mean: f64,
}

impl HistogramSummary {
    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.mean = self.sum / self.count as f64;
    }

    fn merge(&mut self, other: &HistogramSummary) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        self.sum += other.sum;
        self.mean = self.sum / self.count as f64;
    }
}

// ============================================================================
// Metric State
// ============================================================================

#[derive(Debug, Default)]
struct CounterState {
    value: AtomicU64,
}

/// Gauge value stored as `f64` bits.
#[derive(Debug, Default)]
struct GaugeState {
    value: AtomicU64,
}

impl GaugeState {
    fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    fn increment(&self, value: f64) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct HistogramState {
    summary: Mutex<HistogramSummary>,
}

/// Shared state keyed by metric name plus labels.
#[derive(Debug, Default)]
struct RecorderState {
    counters: RwLock<BTreeMap<String, Arc<CounterState>>>,
    gauges: RwLock<BTreeMap<String, Arc<GaugeState>>>,
    histograms: RwLock<BTreeMap<String, Arc<HistogramState>>>,
}

/// Unique string for a key, `name|label=value,...`.
fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();

    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}|{}", key.name(), labels.join(","))
    }
}

fn metric_name(key_str: &str) -> &str {
    key_str.split('|').next().unwrap_or(key_str)
}

fn get_or_create<T: Default>(map: &RwLock<BTreeMap<String, Arc<T>>>, key: &Key) -> Arc<T> {
    let key_str = key_to_string(key);
    if let Some(state) = map.read().get(&key_str) {
        return Arc::clone(state);
    }
    Arc::clone(map.write().entry(key_str).or_default())
}

impl RecorderState {
    fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();

        for (key_str, counter) in self.counters.read().iter() {
            *snapshot
                .counters
                .entry(metric_name(key_str).to_string())
                .or_insert(0) += counter.value.load(Ordering::Relaxed);
        }

        for (key_str, gauge) in self.gauges.read().iter() {
            snapshot
                .gauges
                .insert(metric_name(key_str).to_string(), gauge.get());
        }

        for (key_str, histogram) in self.histograms.read().iter() {
            snapshot
                .histograms
                .entry(metric_name(key_str).to_string())
                .or_default()
                .merge(&histogram.summary.lock());
        }

        snapshot
    }
}

// ============================================================================
// In-Memory Recorder
// ============================================================================

/// Recorder that keeps every metric in memory until the run ends.
///
/// Cloning shares the underlying storage, so one clone can be installed
/// with [`metrics::set_global_recorder`] while another takes the snapshot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecorder {
    state: Arc<RecorderState>,
}

impl InMemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values of everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.snapshot()
    }
}

struct InMemoryCounter {
    state: Arc<CounterState>,
}

impl metrics::CounterFn for InMemoryCounter {
    fn increment(&self, value: u64) {
        self.state.value.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.state.value.store(value, Ordering::Relaxed);
    }
}

struct InMemoryGauge {
    state: Arc<GaugeState>,
}

impl metrics::GaugeFn for InMemoryGauge {
    fn increment(&self, value: f64) {
        self.state.increment(value);
    }

    fn decrement(&self, value: f64) {
        self.state.increment(-value);
    }

    fn set(&self, value: f64) {
        self.state.set(value);
    }
}

struct InMemoryHistogram {
    state: Arc<HistogramState>,
}

impl metrics::HistogramFn for InMemoryHistogram {
    fn record(&self, value: f64) {
        self.state.summary.lock().record(value);
    }
}

impl Recorder for InMemoryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let state = get_or_create(&self.state.counters, key);
        Counter::from_arc(Arc::new(InMemoryCounter { state }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        let state = get_or_create(&self.state.gauges, key);
        Gauge::from_arc(Arc::new(InMemoryGauge { state }))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let state = get_or_create(&self.state.histograms, key);
        Histogram::from_arc(Arc::new(InMemoryHistogram { state }))
    }
}
