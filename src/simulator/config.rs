/// Simulator configuration: stages, thresholds, pacing and run files.
use crate::error::ParseError;
use crate::metrics::ThresholdSet;
use crate::simulator::schedule::StagePlan;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// One step of the load profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// Time spent moving to `target`.
    pub duration: Duration,
    /// Virtual users live at the end of the stage.
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }

    /// Parse the CLI form `DURATION:TARGET`, e.g. `30s:10` or `1m30s:0`.
    pub fn parse_cli(arg: &str) -> Result<Self, ParseError> {
        let (duration, target) = arg
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidStage(arg.to_string()))?;
        let duration = parse_duration(duration)?;
        let target = target
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidStage(arg.to_string()))?;
        Ok(Self { duration, target })
    }
}

/// Parse a duration such as `500ms`, `30s`, `2m`, `1h`, `1m30s` or `0.5s`.
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let text = input.trim();
    let invalid = || ParseError::InvalidDuration(input.to_string());
    if text.is_empty() {
        return Err(invalid());
    }

    if let Ok(secs) = text.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|_| invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        let part = Duration::try_from_secs_f64(value * unit_secs).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }
    Ok(total)
}

/// Pause applied after each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ThinkTime {
    pub fn fixed(duration: Duration) -> Self {
        let ms = duration.as_millis() as u64;
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Pick a pause uniformly from the configured range.
    pub fn sample(&self) -> Duration {
        let delay_ms = if self.min_ms == self.max_ms {
            self.min_ms
        } else {
            fastrand::u64(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(delay_ms)
    }
}

/// Stage as written in a run file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub duration: String,
    pub target: usize,
}

/// TOML run file overriding scenario defaults.
///
/// ```toml
/// base_url = "http://localhost:3000"
/// think_time = "500ms-1500ms"
///
/// [[stages]]
/// duration = "30s"
/// target = 10
///
/// [thresholds]
/// http_req_duration = ["p(95)<2000"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    pub base_url: Option<String>,
    pub start_vus: Option<usize>,
    pub think_time: Option<String>,
    pub graceful_stop: Option<String>,
    pub timeout: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

impl RunFile {
    /// Load a run file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ParseError> {
        Ok(toml::from_str(content)?)
    }

    /// Parsed stages, `None` when the file declares none.
    pub fn stages(&self) -> Result<Option<Vec<Stage>>, ParseError> {
        if self.stages.is_empty() {
            return Ok(None);
        }
        self.stages
            .iter()
            .map(|spec| Ok(Stage::new(parse_duration(&spec.duration)?, spec.target)))
            .collect::<Result<Vec<_>, ParseError>>()
            .map(Some)
    }

    pub fn threshold_sets(&self) -> Vec<ThresholdSet> {
        self.thresholds
            .iter()
            .map(|(metric, expressions)| ThresholdSet {
                metric: metric.clone(),
                expressions: expressions.clone(),
            })
            .collect()
    }
}

/// Configuration for a load run.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Load profile.
    pub stages: Vec<Stage>,
    /// Virtual users live before the first stage starts ramping.
    pub start_vus: usize,
    /// Pass/fail conditions evaluated at run end.
    pub thresholds: Vec<ThresholdSet>,
    /// Pause after each iteration.
    pub think_time: Option<ThinkTime>,
    /// How often the controller re-evaluates the target VU count.
    pub tick: Duration,
    /// Time in-flight iterations get to finish once the plan ends.
    pub graceful_stop: Duration,
}

impl SimulatorConfig {
    /// Create a config for the given stages with default pacing.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            start_vus: 0,
            thresholds: Vec::new(),
            think_time: None,
            tick: Duration::from_millis(100),
            graceful_stop: Duration::from_secs(30),
        }
    }

    /// The stage plan the controller follows.
    pub fn plan(&self) -> StagePlan {
        StagePlan::new(self.start_vus, self.stages.clone())
    }

    /// Parse a think time like `"250-750ms"`, `"1s-2s"` or `"500ms"`.
    pub fn parse_think_time(input: &str) -> Result<ThinkTime, ParseError> {
        let invalid = || ParseError::InvalidDuration(input.to_string());
        let text = input.trim();

        let (min, max) = match text.split_once('-') {
            Some((low, high)) => {
                let high = parse_duration(high)?;
                // "250-750ms": the unit of the upper bound applies to a bare lower bound.
                let low = if low.trim().chars().all(|c| c.is_ascii_digit() || c == '.') {
                    let unit: String = text.chars().skip_while(|c| !c.is_alphabetic()).collect();
                    parse_duration(&format!("{}{}", low.trim(), unit))?
                } else {
                    parse_duration(low)?
                };
                (low, high)
            }
            None => {
                let fixed = parse_duration(text)?;
                (fixed, fixed)
            }
        };

        if min > max {
            return Err(invalid());
        }
        Ok(ThinkTime {
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        })
    }

    /// Override stages, thresholds and pacing with the values a run file sets.
    pub fn apply_run_file(&mut self, file: &RunFile) -> Result<(), ParseError> {
        if let Some(stages) = file.stages()? {
            self.stages = stages;
        }
        if let Some(start_vus) = file.start_vus {
            self.start_vus = start_vus;
        }
        if let Some(ref think_time) = file.think_time {
            self.think_time = Some(Self::parse_think_time(think_time)?);
        }
        if let Some(ref graceful_stop) = file.graceful_stop {
            self.graceful_stop = parse_duration(graceful_stop)?;
        }
        for set in file.threshold_sets() {
            self.set_thresholds(set);
        }
        Ok(())
    }

    /// Replace the thresholds of `set.metric` with `set`.
    pub fn set_thresholds(&mut self, set: ThresholdSet) {
        self.thresholds.retain(|existing| existing.metric != set.metric);
        self.thresholds.push(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_simple_and_compound_durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_durations() {
        for bad in ["", "s", "10x", "-5", "ms10", "1m30", "nan", "inf"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn oversized_durations_are_errors() {
        for bad in ["1e300", "99999999999999999999h", "18446744073709551615s1s"] {
            assert!(
                matches!(parse_duration(bad), Err(ParseError::InvalidDuration(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            Stage::parse_cli("99999999999999999999h:5"),
            Err(ParseError::InvalidDuration(_))
        ));
    }

    #[test]
    fn parses_cli_stage() {
        assert_eq!(
            Stage::parse_cli("30s:10").unwrap(),
            Stage::new(Duration::from_secs(30), 10)
        );
        assert_eq!(
            Stage::parse_cli("1m:0").unwrap(),
            Stage::new(Duration::from_secs(60), 0)
        );
        assert!(matches!(
            Stage::parse_cli("30s"),
            Err(ParseError::InvalidStage(_))
        ));
        assert!(Stage::parse_cli("30s:-1").is_err());
    }

    #[test]
    fn parses_think_time_ranges() {
        let t = SimulatorConfig::parse_think_time("250-750ms").unwrap();
        assert_eq!((t.min_ms, t.max_ms), (250, 750));

        let t = SimulatorConfig::parse_think_time("500ms").unwrap();
        assert_eq!((t.min_ms, t.max_ms), (500, 500));

        let t = SimulatorConfig::parse_think_time("1s-2s").unwrap();
        assert_eq!((t.min_ms, t.max_ms), (1000, 2000));

        assert!(SimulatorConfig::parse_think_time("2s-1s").is_err());
    }

    #[test]
    fn think_time_samples_stay_in_range() {
        let t = ThinkTime {
            min_ms: 10,
            max_ms: 20,
        };
        for _ in 0..100 {
            let d = t.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(
            ThinkTime::fixed(Duration::from_secs(1)).sample(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn run_file_overrides_config() {
        let mut temp = tempfile::NamedTempFile::new().expect("create temp file");
        let content = r#"
            base_url = "http://api.local:3000"
            think_time = "1s"
            graceful_stop = "5s"

            [[stages]]
            duration = "10s"
            target = 3

            [[stages]]
            duration = "5s"
            target = 0

            [thresholds]
            http_req_duration = ["p(95)<800", "avg<300"]
        "#;
        temp.write_all(content.as_bytes())
            .expect("write run file");

        let file = RunFile::from_file(temp.path()).expect("load run file");
        assert_eq!(file.base_url.as_deref(), Some("http://api.local:3000"));

        let mut config = SimulatorConfig::new(vec![Stage::new(Duration::from_secs(1), 1)]);
        config.set_thresholds(ThresholdSet::new("http_req_duration", &["p(95)<2000"]));
        config.set_thresholds(ThresholdSet::new("http_req_failed", &["rate<0.1"]));
        config.apply_run_file(&file).expect("apply run file");

        assert_eq!(
            config.stages,
            vec![
                Stage::new(Duration::from_secs(10), 3),
                Stage::new(Duration::from_secs(5), 0)
            ]
        );
        assert_eq!(config.graceful_stop, Duration::from_secs(5));
        assert_eq!(config.think_time, Some(ThinkTime::fixed(Duration::from_secs(1))));
        assert_eq!(config.thresholds.len(), 2);
        let duration = config
            .thresholds
            .iter()
            .find(|t| t.metric == "http_req_duration")
            .expect("duration thresholds");
        assert_eq!(duration.expressions, vec!["p(95)<800", "avg<300"]);
    }

    #[test]
    fn run_file_rejects_unknown_keys() {
        assert!(matches!(
            RunFile::parse("vus = 10"),
            Err(ParseError::InvalidToml(_))
        ));
    }

    #[test]
    fn run_file_without_stages_keeps_defaults() {
        let file = RunFile::parse("think_time = \"250-750ms\"").expect("valid");
        let mut config = SimulatorConfig::new(vec![Stage::new(Duration::from_secs(2), 4)]);
        config.apply_run_file(&file).expect("apply");
        assert_eq!(config.stages.len(), 1);
        assert_eq!(
            config.think_time,
            Some(ThinkTime {
                min_ms: 250,
                max_ms: 750
            })
        );
    }
}
