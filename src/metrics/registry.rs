/// Thread-safe registry of named metric accumulators.
use crate::error::MetricError;
use crate::metrics::summary::{percentile, CheckSummary, MetricSummary, MetricValues};
use crate::metrics::thresholds::Aggregation;
use crate::metrics::{BUILTIN_METRICS, CHECKS};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Kind of accumulator behind a metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic sum of added values.
    Counter,
    /// Last recorded value, with min and max.
    Gauge,
    /// Share of non-zero (true) additions.
    Rate,
    /// Distribution of samples.
    Trend,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        }
    }
}

#[derive(Debug, Default)]
struct GaugeState {
    value: f64,
    min: f64,
    max: f64,
    seen: bool,
}

/// An f64 sum stored as bits in an `AtomicU64`.
#[derive(Debug, Default)]
struct AtomicSum(AtomicU64);

impl AtomicSum {
    fn add(&self, value: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
enum Accumulator {
    Counter(AtomicSum),
    Gauge(Mutex<GaugeState>),
    Rate { trues: AtomicU64, total: AtomicU64 },
    Trend(Mutex<Vec<f64>>),
}

/// A single named accumulator.
#[derive(Debug)]
pub struct Metric {
    kind: MetricKind,
    acc: Accumulator,
}

impl Metric {
    /// Create an empty accumulator of the given kind.
    pub fn new(kind: MetricKind) -> Self {
        let acc = match kind {
            MetricKind::Counter => Accumulator::Counter(AtomicSum::default()),
            MetricKind::Gauge => Accumulator::Gauge(Mutex::new(GaugeState::default())),
            MetricKind::Rate => Accumulator::Rate {
                trues: AtomicU64::new(0),
                total: AtomicU64::new(0),
            },
            MetricKind::Trend => Accumulator::Trend(Mutex::new(Vec::new())),
        };
        Self { kind, acc }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Add a sample. For rates any non-zero value counts as true.
    pub fn add(&self, value: f64) {
        match &self.acc {
            Accumulator::Counter(sum) => sum.add(value),
            Accumulator::Gauge(state) => {
                let mut state = state.lock();
                if !state.seen {
                    state.min = value;
                    state.max = value;
                    state.seen = true;
                } else {
                    state.min = state.min.min(value);
                    state.max = state.max.max(value);
                }
                state.value = value;
            }
            Accumulator::Rate { trues, total } => {
                if value != 0.0 {
                    trues.fetch_add(1, Ordering::Relaxed);
                }
                total.fetch_add(1, Ordering::Relaxed);
            }
            Accumulator::Trend(samples) => samples.lock().push(value),
        }
    }

    /// Number of samples recorded (counter: the sum).
    pub fn count(&self) -> f64 {
        match &self.acc {
            Accumulator::Counter(sum) => sum.get(),
            Accumulator::Gauge(state) => {
                if state.lock().seen {
                    1.0
                } else {
                    0.0
                }
            }
            Accumulator::Rate { total, .. } => total.load(Ordering::Relaxed) as f64,
            Accumulator::Trend(samples) => samples.lock().len() as f64,
        }
    }

    /// Summarize the accumulator. `elapsed` is used for per-second counter rates.
    pub fn values(&self, elapsed: Duration) -> MetricValues {
        match &self.acc {
            Accumulator::Counter(sum) => {
                let count = sum.get();
                let secs = elapsed.as_secs_f64();
                MetricValues::Counter {
                    count,
                    rate: if secs > 0.0 { count / secs } else { 0.0 },
                }
            }
            Accumulator::Gauge(state) => {
                let state = state.lock();
                MetricValues::Gauge {
                    value: state.value,
                    min: state.min,
                    max: state.max,
                }
            }
            Accumulator::Rate { trues, total } => {
                let passes = trues.load(Ordering::Relaxed);
                let total = total.load(Ordering::Relaxed);
                MetricValues::Rate {
                    passes,
                    fails: total.saturating_sub(passes),
                    rate: if total > 0 {
                        passes as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            }
            Accumulator::Trend(samples) => {
                let mut sorted = samples.lock().clone();
                sorted.sort_by(f64::total_cmp);
                MetricValues::from_sorted_samples(&sorted)
            }
        }
    }

    /// Evaluate an aggregation over the accumulator.
    ///
    /// Returns `None` when the aggregation does not apply to this kind.
    pub fn aggregate(&self, aggregation: &Aggregation, elapsed: Duration) -> Option<f64> {
        match (&self.acc, aggregation) {
            (Accumulator::Trend(samples), agg) => {
                let mut sorted = samples.lock().clone();
                sorted.sort_by(f64::total_cmp);
                if sorted.is_empty() {
                    return match agg {
                        Aggregation::Rate | Aggregation::Value => None,
                        _ => Some(0.0),
                    };
                }
                match agg {
                    Aggregation::Avg => Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
                    Aggregation::Min => sorted.first().copied(),
                    Aggregation::Max => sorted.last().copied(),
                    Aggregation::Med => Some(percentile(&sorted, 50.0)),
                    Aggregation::Percentile(q) => Some(percentile(&sorted, *q)),
                    Aggregation::Count => Some(sorted.len() as f64),
                    Aggregation::Rate | Aggregation::Value => None,
                }
            }
            (Accumulator::Rate { .. }, Aggregation::Rate) => match self.values(elapsed) {
                MetricValues::Rate { rate, .. } => Some(rate),
                _ => None,
            },
            (Accumulator::Rate { .. }, Aggregation::Count) => Some(self.count()),
            (Accumulator::Counter(sum), Aggregation::Count) => Some(sum.get()),
            (Accumulator::Counter(_), Aggregation::Rate) => match self.values(elapsed) {
                MetricValues::Counter { rate, .. } => Some(rate),
                _ => None,
            },
            (Accumulator::Gauge(state), agg) => {
                let state = state.lock();
                match agg {
                    Aggregation::Value => Some(state.value),
                    Aggregation::Min => Some(state.min),
                    Aggregation::Max => Some(state.max),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CheckTally {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Registry of named metrics and check tallies shared by all virtual users.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Arc<Metric>>,
    checks: DashMap<String, Arc<CheckTally>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in run metrics already declared.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, kind) in BUILTIN_METRICS {
            // Fresh registry, names are unique.
            let _ = registry.declare(name, *kind);
        }
        registry
    }

    /// Get or lazily create the accumulator for `name`.
    pub fn declare(&self, name: &str, kind: MetricKind) -> Result<Arc<Metric>, MetricError> {
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }

        let metric = match self.metrics.get(name) {
            Some(existing) => existing.value().clone(),
            None => self
                .metrics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Metric::new(kind)))
                .value()
                .clone(),
        };

        if metric.kind() != kind {
            return Err(MetricError::KindMismatch {
                name: name.to_string(),
                existing: metric.kind().as_str(),
                requested: kind.as_str(),
            });
        }
        Ok(metric)
    }

    /// Record a sample into the named accumulator, creating it on first use.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) -> Result<(), MetricError> {
        self.declare(name, kind)?.add(value);
        Ok(())
    }

    /// Add a true/false outcome to a rate metric.
    pub fn add_rate(&self, name: &str, outcome: bool) -> Result<(), MetricError> {
        self.record(name, MetricKind::Rate, if outcome { 1.0 } else { 0.0 })
    }

    /// Add a sample to a trend metric.
    pub fn add_trend(&self, name: &str, value: f64) -> Result<(), MetricError> {
        self.record(name, MetricKind::Trend, value)
    }

    /// Increment a counter metric.
    pub fn add_counter(&self, name: &str, value: f64) -> Result<(), MetricError> {
        self.record(name, MetricKind::Counter, value)
    }

    /// Set a gauge metric.
    pub fn set_gauge(&self, name: &str, value: f64) -> Result<(), MetricError> {
        self.record(name, MetricKind::Gauge, value)
    }

    /// Record the outcome of a named check. Also feeds the `checks` rate.
    pub fn record_check(&self, name: &str, passed: bool) {
        let tally = match self.checks.get(name) {
            Some(existing) => existing.value().clone(),
            None => self
                .checks
                .entry(name.to_string())
                .or_default()
                .value()
                .clone(),
        };
        if passed {
            tally.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            tally.fails.fetch_add(1, Ordering::Relaxed);
        }
        // `checks` is only ever a rate.
        let _ = self.add_rate(CHECKS, passed);
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<Arc<Metric>> {
        self.metrics.get(name).map(|m| m.value().clone())
    }

    /// Summaries for every metric, sorted by name.
    pub fn snapshot(&self, elapsed: Duration) -> Vec<MetricSummary> {
        let mut summaries: Vec<MetricSummary> = self
            .metrics
            .iter()
            .map(|entry| MetricSummary {
                name: entry.key().clone(),
                kind: entry.value().kind(),
                values: entry.value().values(elapsed),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Pass/fail tallies for every check, sorted by name.
    pub fn check_summaries(&self) -> Vec<CheckSummary> {
        let mut checks: Vec<CheckSummary> = self
            .checks
            .iter()
            .map(|entry| CheckSummary {
                name: entry.key().clone(),
                passes: entry.value().passes.load(Ordering::Relaxed),
                fails: entry.value().fails.load(Ordering::Relaxed),
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        checks
    }
}
