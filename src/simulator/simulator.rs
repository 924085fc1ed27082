/// Staged load profile executor.
use crate::error::AppError;
use crate::metrics::thresholds::{evaluate_all, ThresholdParser};
use crate::metrics::{
    CheckSummary, MetricKind, MetricSummary, MetricsRegistry, ThresholdOutcome, CHECKS,
    ITERATIONS, ITERATION_DURATION, ITERATION_ERRORS, VUS, VUS_MAX,
};
use crate::simulator::config::{SimulatorConfig, ThinkTime};
use crate::simulator::scenario::{RunContext, Scenario, VuContext};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Scenario name
    pub scenario: String,
    /// Wall time from the first stage to the last virtual user exiting
    pub duration_secs: f64,
    /// Iterations that ran to completion (including ones that returned an error)
    pub iterations: u64,
    /// Iterations cut short by a panic or the graceful-stop deadline
    pub interrupted_iterations: u64,
    /// Sum of every virtual user's lifetime
    pub vu_seconds: f64,
    /// Peak concurrent virtual users
    pub vus_max: usize,
    pub metrics: Vec<MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunResult {
    /// True when every threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

#[derive(Debug, Default)]
struct RunTally {
    iterations: AtomicU64,
    interrupted: AtomicU64,
    vu_micros: AtomicU64,
}

impl RunTally {
    fn add_vu_time(&self, lifetime: Duration) {
        self.vu_micros
            .fetch_add(lifetime.as_micros() as u64, Ordering::Relaxed);
    }
}

struct VuHandle {
    id: usize,
    spawned_at: Instant,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl VuHandle {
    fn retire(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Load profile executor.
pub struct Simulator {
    config: SimulatorConfig,
    metrics: Arc<MetricsRegistry>,
    last_elapsed: Mutex<Duration>,
}

impl Simulator {
    /// Create a new simulator with its own metrics registry.
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_metrics(config, Arc::new(MetricsRegistry::with_builtins()))
    }

    /// Create a simulator sharing `metrics` with other components, typically
    /// the HTTP client that records request metrics.
    pub fn with_metrics(config: SimulatorConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            metrics,
            last_elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Record a sample into the named metric, creating it on first use.
    pub fn record_metric(&self, name: &str, kind: MetricKind, value: f64) -> Result<(), AppError> {
        Ok(self.metrics.record(name, kind, value)?)
    }

    /// Evaluate the configured thresholds against everything recorded so far.
    pub fn evaluate_thresholds(&self) -> Result<Vec<ThresholdOutcome>, AppError> {
        let thresholds = ThresholdParser::new()?.parse_sets(&self.config.thresholds)?;
        Ok(evaluate_all(
            &thresholds,
            &self.metrics,
            *self.last_elapsed.lock(),
        ))
    }

    /// Run the scenario through the stage plan.
    pub async fn run<S: Scenario + 'static>(&self, scenario: Arc<S>) -> Result<RunResult, AppError> {
        self.run_with_progress(scenario, None).await
    }

    /// Run the scenario with an optional progress bar measured in seconds.
    pub async fn run_with_progress<S: Scenario + 'static>(
        &self,
        scenario: Arc<S>,
        progress_bar: Option<Arc<indicatif::ProgressBar>>,
    ) -> Result<RunResult, AppError> {
        let plan = self.config.plan();
        // Reject bad expressions before any request goes out.
        let thresholds = ThresholdParser::new()?.parse_sets(&self.config.thresholds)?;
        let tally = Arc::new(RunTally::default());

        if plan.is_empty() {
            tracing::info!(scenario = scenario.name(), "empty stage list, nothing to run");
            return Ok(self.finish(scenario.name(), Duration::ZERO, &tally, 0, &thresholds));
        }

        let ctx = RunContext {
            metrics: self.metrics.clone(),
        };

        tracing::info!(scenario = scenario.name(), "running setup");
        let data = Arc::new(
            scenario
                .setup(&ctx)
                .await
                .map_err(|e| AppError::Setup(e.to_string()))?,
        );

        let total = plan.total_duration();
        let tick = self.config.tick.max(Duration::from_millis(1));
        let start = Instant::now();
        let mut live: Vec<VuHandle> = Vec::with_capacity(plan.peak());
        let mut retiring: Vec<VuHandle> = Vec::new();
        let mut next_id = 1;
        let mut vus_max = 0;
        let mut current_stage = None;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let stage_index = plan.stage_index_at(elapsed);
            if stage_index != current_stage {
                if let Some(index) = stage_index {
                    let stage = plan.stages()[index];
                    tracing::info!(
                        stage = index + 1,
                        stages = plan.stages().len(),
                        target = stage.target,
                        duration = ?stage.duration,
                        "entering stage"
                    );
                }
                current_stage = stage_index;
            }

            Self::reap(&mut live, &tally).await;
            Self::reap(&mut retiring, &tally).await;

            let target = plan.target_at(elapsed);
            while live.len() < target {
                live.push(self.spawn_vu(next_id, &scenario, &data, &tally));
                next_id += 1;
            }
            while live.len() > target {
                if let Some(vu) = live.pop() {
                    vu.retire();
                    retiring.push(vu);
                }
            }

            vus_max = vus_max.max(live.len());
            let _ = self.metrics.set_gauge(VUS, live.len() as f64);
            let _ = self.metrics.set_gauge(VUS_MAX, vus_max as f64);

            if let Some(ref pb) = progress_bar {
                self.update_progress(pb, elapsed, live.len(), target, &tally);
            }

            sleep(tick.min(total - elapsed)).await;
        }

        for vu in live.drain(..) {
            vu.retire();
            retiring.push(vu);
        }
        let _ = self.metrics.set_gauge(VUS, 0.0);

        if let Some(ref pb) = progress_bar {
            pb.set_position(total.as_secs());
            pb.set_message("Waiting for in-flight iterations...");
        }
        self.drain(retiring, &tally).await;

        let elapsed = start.elapsed();

        tracing::info!(scenario = scenario.name(), "running teardown");
        scenario
            .teardown(&ctx, &data)
            .await
            .map_err(|e| AppError::Teardown(e.to_string()))?;

        if let Some(ref pb) = progress_bar {
            pb.finish_with_message("Load test completed");
        }

        Ok(self.finish(scenario.name(), elapsed, &tally, vus_max, &thresholds))
    }

    fn spawn_vu<S: Scenario + 'static>(
        &self,
        id: usize,
        scenario: &Arc<S>,
        data: &Arc<S::Data>,
        tally: &Arc<RunTally>,
    ) -> VuHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(Self::vu_loop(
            scenario.clone(),
            data.clone(),
            VuContext::new(id, self.metrics.clone()),
            stop.clone(),
            self.config.think_time,
            tally.clone(),
        ));
        tracing::debug!(vu = id, "virtual user started");
        VuHandle {
            id,
            spawned_at: Instant::now(),
            stop,
            handle,
        }
    }

    async fn vu_loop<S: Scenario + 'static>(
        scenario: Arc<S>,
        data: Arc<S::Data>,
        mut ctx: VuContext,
        stop: Arc<AtomicBool>,
        think_time: Option<ThinkTime>,
        tally: Arc<RunTally>,
    ) {
        let started = Instant::now();
        let metrics = ctx.metrics_handle();

        while !stop.load(Ordering::Acquire) {
            let iteration_start = Instant::now();
            if let Err(e) = scenario.iteration(&mut ctx, &data).await {
                tracing::debug!(vu = ctx.id(), iteration = ctx.iteration(), error = %e, "iteration failed");
                metrics.record_check("iteration completed", false);
                let _ = metrics.add_counter(ITERATION_ERRORS, 1.0);
            }
            let _ = metrics.add_trend(
                ITERATION_DURATION,
                iteration_start.elapsed().as_secs_f64() * 1000.0,
            );
            let _ = metrics.add_counter(ITERATIONS, 1.0);
            tally.iterations.fetch_add(1, Ordering::Relaxed);
            ctx.advance();

            if let Some(think) = think_time {
                if !stop.load(Ordering::Acquire) {
                    sleep(think.sample()).await;
                }
            }
        }

        tally.add_vu_time(started.elapsed());
        tracing::debug!(vu = ctx.id(), iterations = ctx.iteration(), "virtual user stopped");
    }

    /// Join virtual users whose task already ended.
    async fn reap(vus: &mut Vec<VuHandle>, tally: &RunTally) {
        let mut index = 0;
        while index < vus.len() {
            if vus[index].handle.is_finished() {
                let vu = vus.swap_remove(index);
                Self::join(vu, tally).await;
            } else {
                index += 1;
            }
        }
    }

    async fn join(vu: VuHandle, tally: &RunTally) {
        if let Err(e) = vu.handle.await {
            tracing::warn!(vu = vu.id, error = %e, "virtual user terminated abnormally");
            tally.interrupted.fetch_add(1, Ordering::Relaxed);
            tally.add_vu_time(vu.spawned_at.elapsed());
        }
    }

    /// Wait for retired virtual users, aborting the ones that outlive the
    /// graceful-stop window.
    async fn drain(&self, vus: Vec<VuHandle>, tally: &RunTally) {
        let deadline = Instant::now() + self.config.graceful_stop;
        for mut vu in vus {
            match timeout_at(deadline, &mut vu.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(vu = vu.id, error = %e, "virtual user terminated abnormally");
                    tally.interrupted.fetch_add(1, Ordering::Relaxed);
                    tally.add_vu_time(vu.spawned_at.elapsed());
                }
                Err(_) => {
                    vu.handle.abort();
                    tracing::warn!(vu = vu.id, "iteration interrupted by graceful stop");
                    tally.interrupted.fetch_add(1, Ordering::Relaxed);
                    tally.add_vu_time(vu.spawned_at.elapsed());
                }
            }
        }
    }

    fn update_progress(
        &self,
        pb: &indicatif::ProgressBar,
        elapsed: Duration,
        live: usize,
        target: usize,
        tally: &RunTally,
    ) {
        let failed_checks = self
            .metrics
            .get(CHECKS)
            .map(|m| match m.values(elapsed) {
                crate::metrics::MetricValues::Rate { fails, .. } => fails,
                _ => 0,
            })
            .unwrap_or(0);

        pb.set_message(format!(
            "VUs: {}/{} | Iterations: {} | Failed checks: {}",
            live,
            target,
            tally.iterations.load(Ordering::Relaxed),
            failed_checks
        ));
        pb.set_position(elapsed.as_secs());
    }

    fn finish(
        &self,
        scenario: &str,
        elapsed: Duration,
        tally: &RunTally,
        vus_max: usize,
        thresholds: &[crate::metrics::Threshold],
    ) -> RunResult {
        *self.last_elapsed.lock() = elapsed;
        RunResult {
            scenario: scenario.to_string(),
            duration_secs: elapsed.as_secs_f64(),
            iterations: tally.iterations.load(Ordering::Relaxed),
            interrupted_iterations: tally.interrupted.load(Ordering::Relaxed),
            vu_seconds: tally.vu_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            vus_max,
            metrics: self.metrics.snapshot(elapsed),
            checks: self.metrics.check_summaries(),
            thresholds: evaluate_all(thresholds, &self.metrics, elapsed),
        }
    }
}
