/// Human-readable summaries.
use crate::contract::ContractReport;
use crate::error::AppError;
use crate::metrics::{MetricSummary, MetricValues};
use crate::output::{number, Formatter, ReportFormatter};
use crate::simulator::RunResult;

const PASS: &str = "✓";
const FAIL: &str = "✗";
const NAME_WIDTH: usize = 32;

/// Text formatter for terminal output.
#[derive(Debug, Default)]
pub struct TextFormatter;

impl TextFormatter {
    pub fn new() -> Self {
        Self
    }

    fn metric_line(summary: &MetricSummary) -> String {
        let values = match &summary.values {
            MetricValues::Counter { count, rate } => {
                format!("count={} rate={}/s", number(*count), number(*rate))
            }
            MetricValues::Gauge { value, min, max } => format!(
                "value={} min={} max={}",
                number(*value),
                number(*min),
                number(*max)
            ),
            MetricValues::Rate {
                passes,
                fails,
                rate,
            } => format!(
                "{:.2}% {} {} {} {}",
                rate * 100.0,
                PASS,
                passes,
                FAIL,
                fails
            ),
            MetricValues::Trend {
                avg,
                min,
                med,
                max,
                p90,
                p95,
                ..
            } => format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={}",
                number(*avg),
                number(*min),
                number(*med),
                number(*max),
                number(*p90),
                number(*p95)
            ),
        };
        format!(
            "  {:.<width$}: {}",
            summary.name,
            values,
            width = NAME_WIDTH
        )
    }
}

impl Formatter for TextFormatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError> {
        let mut output = vec![
            format!("\n=== Load Test Results: {} ===", result.scenario),
            format!("Duration: {:.1}s", result.duration_secs),
            format!(
                "Iterations: {} ({} interrupted)",
                result.iterations, result.interrupted_iterations
            ),
            format!("VUs max: {}", result.vus_max),
            format!("VU-seconds: {:.1}", result.vu_seconds),
        ];

        if !result.checks.is_empty() {
            output.push("\nChecks:".to_string());
            for check in &result.checks {
                if check.fails == 0 {
                    output.push(format!("  {} {}", PASS, check.name));
                } else {
                    output.push(format!(
                        "  {} {} ({:.2}% passed, {} failed)",
                        FAIL,
                        check.name,
                        check.pass_rate() * 100.0,
                        check.fails
                    ));
                }
            }
        }

        output.push("\nMetrics:".to_string());
        output.extend(result.metrics.iter().map(Self::metric_line));

        if !result.thresholds.is_empty() {
            output.push("\nThresholds:".to_string());
            for outcome in &result.thresholds {
                let actual = outcome
                    .actual
                    .map(number)
                    .unwrap_or_else(|| "n/a".to_string());
                output.push(format!(
                    "  {} {} {} (actual {})",
                    if outcome.passed { PASS } else { FAIL },
                    outcome.metric,
                    outcome.expression,
                    actual
                ));
            }
        }

        output.push(format!(
            "\nResult: {}",
            if result.passed() { "PASSED" } else { "FAILED" }
        ));
        Ok(output.join("\n"))
    }
}

impl ReportFormatter for TextFormatter {
    fn format_report(&self, report: &ContractReport) -> Result<String, AppError> {
        let mut output = vec![format!("Contract checks against {}", report.base_url)];

        let mut endpoint = "";
        for case in &report.cases {
            if case.endpoint != endpoint {
                endpoint = case.endpoint.as_str();
                output.push(format!("\n{}", endpoint));
            }
            let mark = if case.passed() { PASS } else { FAIL };
            output.push(format!("  {} {}", mark, case.name));
            for failure in case.failures() {
                match failure.detail {
                    Some(ref detail) => {
                        output.push(format!("      {} {}: {}", FAIL, failure.description, detail))
                    }
                    None => output.push(format!("      {} {}", FAIL, failure.description)),
                }
            }
        }

        output.push(format!(
            "\n{} passed, {} failed ({:.2}s)",
            report.passed_cases(),
            report.failed_cases(),
            report.duration_secs
        ));
        Ok(output.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::{contract_report, run_result};

    #[test]
    fn run_summary_lists_checks_metrics_and_thresholds() {
        let output = TextFormatter::new().format_run(&run_result()).expect("format");

        assert!(output.contains("=== Load Test Results: full ==="));
        assert!(output.contains("Iterations: 240 (1 interrupted)"));
        assert!(output.contains("✓ GET /users - status is 200"));
        assert!(output.contains("✗ POST /transfers - status is 201 (90.00% passed, 5 failed)"));
        assert!(output.contains("p(95)=450.50"));
        assert!(output.contains("✓ http_req_duration p(95)<2000 (actual 450.50)"));
        assert!(output.contains("✗ errors rate<0.01 (actual n/a)"));
        assert!(output.ends_with("Result: FAILED"));
    }

    #[test]
    fn metric_names_are_dot_padded() {
        let output = TextFormatter::new().format_run(&run_result()).expect("format");
        let line = output
            .lines()
            .find(|l| l.contains("http_reqs"))
            .expect("http_reqs line");
        assert!(line.starts_with("  http_reqs......"));
        assert!(line.contains("count=100 rate=0.83/s"));
    }

    #[test]
    fn contract_report_groups_by_endpoint() {
        let output = TextFormatter::new()
            .format_report(&contract_report())
            .expect("format");

        assert!(output.starts_with("Contract checks against http://localhost:3000"));
        assert!(output.contains("\nGET /users\n  ✓ lists users"));
        assert!(output.contains("      ✗ status is 401: status was 200"));
        assert!(output.contains("1 passed, 1 failed (0.42s)"));
    }
}
