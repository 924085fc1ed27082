/// Threshold expressions over aggregated metrics.
///
/// Expressions follow the `aggregation operator value` form used by the run
/// files, e.g. `p(95)<2000`, `rate<0.1`, `avg<=250`, `count>0`.
use crate::error::{AppError, ParseError};
use crate::metrics::registry::MetricsRegistry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Aggregation a threshold compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// `p(N)`, N in `0..=100`.
    Percentile(f64),
    Rate,
    Count,
    Value,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(q) => write!(f, "p({})", q),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Value => write!(f, "value"),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            _ => None,
        }
    }

    pub fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            Operator::Lt => actual < expected,
            Operator::Le => actual <= expected,
            Operator::Gt => actual > expected,
            Operator::Ge => actual >= expected,
            Operator::Eq => actual == expected,
            Operator::Ne => actual != expected,
        }
    }
}

/// Threshold expressions for one metric, as written in run files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new(metric: impl Into<String>, expressions: &[&str]) -> Self {
        Self {
            metric: metric.into(),
            expressions: expressions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Parse the CLI form `metric=expression`.
    pub fn parse_cli(arg: &str) -> Result<Self, ParseError> {
        let (metric, expression) = arg.split_once('=').ok_or_else(|| {
            ParseError::InvalidThreshold {
                expression: arg.to_string(),
                reason: "expected METRIC=EXPRESSION".to_string(),
            }
        })?;
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(ParseError::InvalidThreshold {
                expression: arg.to_string(),
                reason: "missing metric name".to_string(),
            });
        }
        Ok(Self {
            metric: metric.to_string(),
            expressions: vec![expression.trim().to_string()],
        })
    }
}

/// A parsed threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub value: f64,
}

/// Result of evaluating one threshold at run end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    /// Aggregated value, `None` when the metric is missing or the
    /// aggregation does not apply to its kind.
    pub actual: Option<f64>,
}

/// Parser for threshold expressions.
pub struct ThresholdParser {
    expression_regex: Regex,
}

impl ThresholdParser {
    /// Create a new parser.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            expression_regex: Regex::new(
                r"^\s*(avg|min|max|med|rate|count|value|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$",
            )
            .map_err(|e| AppError::Config(format!("Invalid threshold pattern: {}", e)))?,
        })
    }

    /// Parse one expression for `metric`.
    pub fn parse(&self, metric: &str, expression: &str) -> Result<Threshold, ParseError> {
        let invalid = |reason: &str| ParseError::InvalidThreshold {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let captures = self
            .expression_regex
            .captures(expression)
            .ok_or_else(|| invalid("expected e.g. p(95)<2000, rate<0.1 or avg<=200"))?;

        let aggregation = match &captures[1] {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            "value" => Aggregation::Value,
            _ => {
                let q: f64 = captures[2]
                    .parse()
                    .map_err(|_| invalid("percentile is not a number"))?;
                if q > 100.0 {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregation::Percentile(q)
            }
        };

        let operator = Operator::from_symbol(&captures[3]).ok_or_else(|| invalid("unknown operator"))?;
        let value: f64 = captures[4]
            .parse()
            .map_err(|_| invalid("threshold value is not a number"))?;

        Ok(Threshold {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            aggregation,
            operator,
            value,
        })
    }

    /// Parse every expression of every set.
    pub fn parse_sets(&self, sets: &[ThresholdSet]) -> Result<Vec<Threshold>, ParseError> {
        sets.iter()
            .flat_map(|set| {
                set.expressions
                    .iter()
                    .map(move |expression| self.parse(&set.metric, expression))
            })
            .collect()
    }
}

impl Threshold {
    /// Evaluate against the registry. `elapsed` is the run duration.
    pub fn evaluate(&self, registry: &MetricsRegistry, elapsed: Duration) -> ThresholdOutcome {
        let actual = registry
            .get(&self.metric)
            .and_then(|metric| metric.aggregate(&self.aggregation, elapsed));

        ThresholdOutcome {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            passed: actual.is_some_and(|actual| self.operator.holds(actual, self.value)),
            actual,
        }
    }
}

/// Evaluate all thresholds, logging the ones that fail.
pub fn evaluate_all(
    thresholds: &[Threshold],
    registry: &MetricsRegistry,
    elapsed: Duration,
) -> Vec<ThresholdOutcome> {
    thresholds
        .iter()
        .map(|threshold| {
            let outcome = threshold.evaluate(registry, elapsed);
            if !outcome.passed {
                tracing::warn!(
                    metric = %outcome.metric,
                    expression = %outcome.expression,
                    actual = ?outcome.actual,
                    "threshold crossed"
                );
            }
            outcome
        })
        .collect()
}
