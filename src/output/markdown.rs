/// Markdown formatter for reports.
use crate::contract::ContractReport;
use crate::error::AppError;
use crate::metrics::MetricValues;
use crate::output::{number, Formatter, ReportFormatter};
use crate::simulator::RunResult;

/// Markdown formatter for generating markdown reports.
#[derive(Debug, Default)]
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self
    }
}

/// Pipes inside a cell would split the row.
fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn status(passed: bool) -> &'static str {
    if passed {
        "✅"
    } else {
        "❌"
    }
}

impl Formatter for MarkdownFormatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError> {
        let mut output = Vec::new();

        output.push(format!("## Load Test: {}", result.scenario));
        output.push(String::new());
        output.push(format!("- **Duration:** {:.1}s", result.duration_secs));
        output.push(format!(
            "- **Iterations:** {} ({} interrupted)",
            result.iterations, result.interrupted_iterations
        ));
        output.push(format!("- **VUs max:** {}", result.vus_max));
        output.push(format!(
            "- **Result:** {}",
            if result.passed() { "PASSED" } else { "FAILED" }
        ));
        output.push(String::new());

        output.push("### Metrics".to_string());
        output.push(String::new());
        output.push("| Metric | Type | Values |".to_string());
        output.push("|--------|------|--------|".to_string());
        for summary in &result.metrics {
            let values = match &summary.values {
                MetricValues::Counter { count, rate } => {
                    format!("{} ({}/s)", number(*count), number(*rate))
                }
                MetricValues::Gauge { value, min, max } => format!(
                    "{} (min {}, max {})",
                    number(*value),
                    number(*min),
                    number(*max)
                ),
                MetricValues::Rate {
                    passes,
                    fails,
                    rate,
                } => format!("{:.2}% ({} / {})", rate * 100.0, passes, passes + fails),
                MetricValues::Trend {
                    avg, med, p90, p95, ..
                } => format!(
                    "avg {} / med {} / p(90) {} / p(95) {}",
                    number(*avg),
                    number(*med),
                    number(*p90),
                    number(*p95)
                ),
            };
            output.push(format!(
                "| {} | {} | {} |",
                cell(&summary.name),
                summary.kind.as_str(),
                values
            ));
        }

        if !result.checks.is_empty() {
            output.push(String::new());
            output.push("### Checks".to_string());
            output.push(String::new());
            output.push("| Check | Passes | Fails |".to_string());
            output.push("|-------|--------|-------|".to_string());
            for check in &result.checks {
                output.push(format!(
                    "| {} {} | {} | {} |",
                    status(check.fails == 0),
                    cell(&check.name),
                    check.passes,
                    check.fails
                ));
            }
        }

        if !result.thresholds.is_empty() {
            output.push(String::new());
            output.push("### Thresholds".to_string());
            output.push(String::new());
            output.push("| Metric | Expression | Actual | Status |".to_string());
            output.push("|--------|------------|--------|--------|".to_string());
            for outcome in &result.thresholds {
                output.push(format!(
                    "| {} | `{}` | {} | {} |",
                    cell(&outcome.metric),
                    outcome.expression,
                    outcome.actual.map(number).unwrap_or_else(|| "n/a".to_string()),
                    status(outcome.passed)
                ));
            }
        }

        Ok(output.join("\n"))
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format_report(&self, report: &ContractReport) -> Result<String, AppError> {
        let mut output = vec![
            format!("## Contract Checks: {}", report.base_url),
            String::new(),
            format!(
                "**{} passed, {} failed** in {:.2}s",
                report.passed_cases(),
                report.failed_cases(),
                report.duration_secs
            ),
            String::new(),
            "| Endpoint | Case | Status | Failures |".to_string(),
            "|----------|------|--------|----------|".to_string(),
        ];

        for case in &report.cases {
            let failures: Vec<String> = case
                .failures()
                .map(|f| match &f.detail {
                    Some(detail) => format!("{}: {}", f.description, detail),
                    None => f.description.clone(),
                })
                .collect();
            output.push(format!(
                "| {} | {} | {} | {} |",
                cell(&case.endpoint),
                cell(&case.name),
                status(case.passed()),
                cell(&failures.join("; "))
            ));
        }

        Ok(output.join("\n"))
    }
}
