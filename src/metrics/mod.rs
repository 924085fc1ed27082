/// Metric accumulation, summaries and threshold evaluation.
pub mod registry;
pub mod summary;
pub mod thresholds;

pub use registry::{Metric, MetricKind, MetricsRegistry};
pub use summary::{percentile, CheckSummary, MetricSummary, MetricValues};
pub use thresholds::{Aggregation, Operator, Threshold, ThresholdOutcome, ThresholdSet};

/// Number of requests issued.
pub const HTTP_REQS: &str = "http_reqs";
/// Request latency in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Share of requests that failed (transport error or status >= 400).
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Completed iterations.
pub const ITERATIONS: &str = "iterations";
/// Iteration latency in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Iterations that returned an error.
pub const ITERATION_ERRORS: &str = "iteration_errors";
/// Live virtual users.
pub const VUS: &str = "vus";
/// Peak virtual users.
pub const VUS_MAX: &str = "vus_max";
/// Share of passed checks.
pub const CHECKS: &str = "checks";

/// Metrics every run registers up front, so thresholds on them never
/// reference a missing metric.
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (HTTP_REQS, MetricKind::Counter),
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (ITERATIONS, MetricKind::Counter),
    (ITERATION_DURATION, MetricKind::Trend),
    (VUS, MetricKind::Gauge),
    (VUS_MAX, MetricKind::Gauge),
    (CHECKS, MetricKind::Rate),
];
