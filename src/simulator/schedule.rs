/// Target virtual-user count over time for a staged profile.
use crate::simulator::config::Stage;
use std::time::Duration;

/// An ordered list of stages with the count they ramp from.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    start_vus: usize,
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(start_vus: usize, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest target any stage reaches.
    pub fn peak(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.start_vus))
            .max()
            .unwrap_or(0)
    }

    /// Index of the stage active at `elapsed`, `None` once the plan is over.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }
        None
    }

    /// Linearly interpolated target at `elapsed`, rounded to the nearest VU.
    ///
    /// Zero-duration stages are instantaneous steps. Once the plan has
    /// elapsed the target is 0.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        self.exact_target_at(elapsed).round() as usize
    }

    fn exact_target_at(&self, elapsed: Duration) -> f64 {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_vus as f64;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return previous + (stage.target as f64 - previous) * progress;
            }
            stage_start = stage_end;
            previous = stage.target as f64;
        }
        0.0
    }

    /// Integral of the target ramp in VU-seconds.
    pub fn vu_seconds(&self) -> f64 {
        let mut previous = self.start_vus as f64;
        let mut total = 0.0;
        for stage in &self.stages {
            let target = stage.target as f64;
            total += (previous + target) / 2.0 * stage.duration.as_secs_f64();
            previous = target;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_hold_down() -> StagePlan {
        StagePlan::new(
            0,
            vec![
                Stage::new(secs(30), 10),
                Stage::new(secs(60), 10),
                Stage::new(secs(30), 0),
            ],
        )
    }

    #[test]
    fn interpolates_linearly_between_targets() {
        let plan = ramp_hold_down();
        assert_eq!(plan.target_at(Duration::ZERO), 0);
        assert_eq!(plan.target_at(secs(15)), 5);
        assert_eq!(plan.target_at(secs(30)), 10);
        assert_eq!(plan.target_at(secs(60)), 10);
        assert_eq!(plan.target_at(secs(105)), 5);
        assert_eq!(plan.target_at(secs(120)), 0);
        assert_eq!(plan.target_at(secs(500)), 0);
    }

    #[test]
    fn totals_and_peak() {
        let plan = ramp_hold_down();
        assert_eq!(plan.total_duration(), secs(120));
        assert_eq!(plan.peak(), 10);
        assert_eq!(plan.vu_seconds(), 150.0 + 600.0 + 150.0);
    }

    #[test]
    fn stage_index_tracks_elapsed() {
        let plan = ramp_hold_down();
        assert_eq!(plan.stage_index_at(secs(0)), Some(0));
        assert_eq!(plan.stage_index_at(secs(30)), Some(1));
        assert_eq!(plan.stage_index_at(secs(119)), Some(2));
        assert_eq!(plan.stage_index_at(secs(120)), None);
    }

    #[test]
    fn zero_duration_stage_is_a_step() {
        let plan = StagePlan::new(
            0,
            vec![Stage::new(Duration::ZERO, 8), Stage::new(secs(10), 8)],
        );
        assert_eq!(plan.target_at(Duration::ZERO), 8);
        assert_eq!(plan.target_at(secs(5)), 8);
        assert_eq!(plan.vu_seconds(), 80.0);
    }

    #[test]
    fn ramps_from_start_vus() {
        let plan = StagePlan::new(4, vec![Stage::new(secs(10), 0)]);
        assert_eq!(plan.target_at(Duration::ZERO), 4);
        assert_eq!(plan.target_at(secs(5)), 2);
        assert_eq!(plan.vu_seconds(), 20.0);
    }

    #[test]
    fn empty_plan_is_idle() {
        let plan = StagePlan::new(0, Vec::new());
        assert!(plan.is_empty());
        assert_eq!(plan.total_duration(), Duration::ZERO);
        assert_eq!(plan.target_at(Duration::ZERO), 0);
        assert_eq!(plan.vu_seconds(), 0.0);
    }
}
