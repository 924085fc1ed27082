/// The workload seam the executor drives.
use crate::error::AppError;
use crate::metrics::{MetricKind, MetricsRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Context handed to setup and teardown.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub metrics: Arc<MetricsRegistry>,
}

/// Per virtual-user context handed to every iteration.
#[derive(Debug)]
pub struct VuContext {
    id: usize,
    iteration: u64,
    metrics: Arc<MetricsRegistry>,
}

impl VuContext {
    pub fn new(id: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            id,
            iteration: 0,
            metrics,
        }
    }

    /// Virtual user id, unique within a run and starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Zero-based iteration number of this virtual user.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub(crate) fn metrics_handle(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Evaluate named checks against `value`, recording each outcome.
    ///
    /// Returns `true` when every check passed.
    pub fn check<T>(&self, value: &T, checks: &[(&str, &dyn Fn(&T) -> bool)]) -> bool {
        let mut all_passed = true;
        for (name, predicate) in checks {
            let passed = predicate(value);
            self.metrics.record_check(name, passed);
            all_passed &= passed;
        }
        all_passed
    }

    /// Record a sample into a custom metric.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) -> Result<(), AppError> {
        Ok(self.metrics.record(name, kind, value)?)
    }

    /// Add an outcome to a custom rate metric.
    pub fn add_rate(&self, name: &str, outcome: bool) -> Result<(), AppError> {
        Ok(self.metrics.add_rate(name, outcome)?)
    }

    /// Pause this virtual user.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A workload: one-off setup, a repeated iteration, and teardown.
///
/// `setup` runs once before any virtual user starts and its result is shared
/// read-only with every iteration. An iteration error is recorded as a failed
/// outcome and the virtual user carries on; setup and teardown errors abort
/// the run.
#[async_trait::async_trait]
pub trait Scenario: Send + Sync {
    /// State produced by setup.
    type Data: Send + Sync + 'static;

    /// Scenario name used in logs and reports.
    fn name(&self) -> &str;

    async fn setup(&self, ctx: &RunContext) -> Result<Self::Data, AppError>;

    async fn iteration(&self, vu: &mut VuContext, data: &Self::Data) -> Result<(), AppError>;

    async fn teardown(&self, _ctx: &RunContext, _data: &Self::Data) -> Result<(), AppError> {
        Ok(())
    }
}
