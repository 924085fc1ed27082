/// Prometheus text exposition of a finished run, for pushing to a gateway
/// or scraping from a file.
use crate::error::AppError;
use crate::metrics::{CheckSummary, MetricValues};
use crate::output::Formatter;
use crate::simulator::RunResult;

const PREFIX: &str = "rampa_";

/// Prometheus formatter.
#[derive(Debug, Default)]
pub struct PrometheusFormatter;

impl PrometheusFormatter {
    pub fn new() -> Self {
        Self
    }
}

/// Metric names may only contain `[a-zA-Z0-9_:]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':' => c,
            _ => '_',
        })
        .collect()
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn header(output: &mut String, name: &str, kind: &str, help: &str) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} {}\n", name, kind));
}

impl Formatter for PrometheusFormatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError> {
        let mut output = String::new();

        for summary in &result.metrics {
            let name = format!("{}{}", PREFIX, sanitize(&summary.name));
            match &summary.values {
                MetricValues::Counter { count, .. } => {
                    let name = format!("{}_total", name);
                    header(&mut output, &name, "counter", &summary.name);
                    output.push_str(&format!("{} {}\n", name, count));
                }
                MetricValues::Gauge { value, .. } => {
                    header(&mut output, &name, "gauge", &summary.name);
                    output.push_str(&format!("{} {}\n", name, value));
                }
                MetricValues::Rate { rate, .. } => {
                    header(&mut output, &name, "gauge", &summary.name);
                    output.push_str(&format!("{} {}\n", name, rate));
                }
                MetricValues::Trend {
                    count,
                    avg,
                    med,
                    p90,
                    p95,
                    p99,
                    ..
                } => {
                    header(&mut output, &name, "summary", &summary.name);
                    for (quantile, value) in
                        [("0.5", med), ("0.9", p90), ("0.95", p95), ("0.99", p99)]
                    {
                        output.push_str(&format!(
                            "{}{{quantile=\"{}\"}} {}\n",
                            name, quantile, value
                        ));
                    }
                    output.push_str(&format!("{}_sum {}\n", name, avg * *count as f64));
                    output.push_str(&format!("{}_count {}\n", name, count));
                }
            }
        }

        if !result.checks.is_empty() {
            let series: [(&str, &str, fn(&CheckSummary) -> u64); 2] = [
                ("passes", "Passing check evaluations", |c| c.passes),
                ("fails", "Failing check evaluations", |c| c.fails),
            ];
            for (suffix, help, tally) in series {
                let name = format!("{}check_{}_total", PREFIX, suffix);
                header(&mut output, &name, "counter", help);
                for check in &result.checks {
                    let value = tally(check);
                    output.push_str(&format!(
                        "{}{{check=\"{}\"}} {}\n",
                        name,
                        escape_label(&check.name),
                        value
                    ));
                }
            }
        }

        if !result.thresholds.is_empty() {
            let name = format!("{}threshold_passed", PREFIX);
            header(&mut output, &name, "gauge", "1 when the threshold held");
            for outcome in &result.thresholds {
                output.push_str(&format!(
                    "{}{{metric=\"{}\",expression=\"{}\"}} {}\n",
                    name,
                    escape_label(&outcome.metric),
                    escape_label(&outcome.expression),
                    u8::from(outcome.passed)
                ));
            }
        }

        let name = format!("{}iterations_interrupted_total", PREFIX);
        header(&mut output, &name, "counter", "Iterations cut short");
        output.push_str(&format!("{} {}\n", name, result.interrupted_iterations));

        Ok(output)
    }
}
