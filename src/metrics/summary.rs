/// Aggregated views over recorded metrics.
use crate::metrics::registry::MetricKind;
use serde::Serialize;

/// Value of the `q`-th percentile over ascending `sorted` samples.
///
/// Picks the sample at index `floor(q / 100 * n)`, clamped to the last one,
/// so `percentile(s, 95.0) < x` holds iff fewer than 5% of the samples are
/// `>= x`. Returns 0 for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q.clamp(0.0, 100.0) * sorted.len() as f64 / 100.0).floor() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Summary values for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricValues {
    Counter {
        count: f64,
        /// Per second over the run.
        rate: f64,
    },
    Gauge {
        value: f64,
        min: f64,
        max: f64,
    },
    Rate {
        passes: u64,
        fails: u64,
        rate: f64,
    },
    Trend {
        count: usize,
        avg: f64,
        min: f64,
        med: f64,
        max: f64,
        p90: f64,
        p95: f64,
        p99: f64,
    },
}

impl MetricValues {
    /// Build trend values from ascending samples.
    pub fn from_sorted_samples(sorted: &[f64]) -> Self {
        let count = sorted.len();
        let avg = if count > 0 {
            sorted.iter().sum::<f64>() / count as f64
        } else {
            0.0
        };
        MetricValues::Trend {
            count,
            avg,
            min: sorted.first().copied().unwrap_or(0.0),
            med: percentile(sorted, 50.0),
            max: sorted.last().copied().unwrap_or(0.0),
            p90: percentile(sorted, 90.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
        }
    }
}

/// A metric name with its summarized values.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub values: MetricValues,
}

/// Tallies for one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Share of passing evaluations, 0 when the check never ran.
    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.passes as f64 / self.total() as f64
        }
    }
}
