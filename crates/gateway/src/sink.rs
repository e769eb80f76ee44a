//! Injected metrics sink.
//!
//! The gateway and the sequence engine take a `MetricsSink` in their
//! constructors instead of reaching for a global recorder.

use parking_lot::Mutex;
use tracing::debug;

/// Destination for counters and observations.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)]);
    fn observe(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]);
}

/// Emits every metric as a `tracing` debug event. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        debug!(metric = name, labels = ?labels, "counter +1");
    }

    fn observe(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
        debug!(metric = name, value, labels = ?labels, "observation");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment(&self, _name: &'static str, _labels: &[(&'static str, &str)]) {}
    fn observe(&self, _name: &'static str, _value: f64, _labels: &[(&'static str, &str)]) {}
}

/// A recorded metric.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: &'static str,
    pub value: f64,
    pub labels: Vec<(&'static str, String)>,
}

/// Keeps every metric in memory; for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().clone()
    }

    /// Number of increments of `name` whose labels include `label`.
    pub fn count(&self, name: &str, label: Option<(&str, &str)>) -> usize {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .filter(|m| match label {
                Some((k, v)) => m.labels.iter().any(|(lk, lv)| *lk == k && lv == v),
                None => true,
            })
            .count()
    }

    fn push(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
        self.metrics.lock().push(RecordedMetric {
            name,
            value,
            labels: labels.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
        });
    }
}

impl MetricsSink for RecordingSink {
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        self.push(name, 1.0, labels);
    }

    fn observe(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
        self.push(name, value, labels);
    }
}
