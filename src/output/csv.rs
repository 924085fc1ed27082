/// CSV output, one row per metric.
use crate::error::AppError;
use crate::metrics::MetricValues;
use crate::output::Formatter;
use crate::simulator::RunResult;

const HEADER: &str = "metric,type,count,rate,value,min,max,avg,med,p90,p95,p99,passes,fails";

/// CSV formatter.
#[derive(Debug, Default)]
pub struct CsvFormatter;

impl CsvFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl Formatter for CsvFormatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError> {
        let mut rows = vec![HEADER.to_string()];
        for summary in &result.metrics {
            // count,rate,value,min,max,avg,med,p90,p95,p99,passes,fails
            let columns: [String; 12] = match &summary.values {
                MetricValues::Counter { count, rate } => [
                    count.to_string(),
                    format!("{:.6}", rate),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                ],
                MetricValues::Gauge { value, min, max } => [
                    String::new(),
                    String::new(),
                    value.to_string(),
                    min.to_string(),
                    max.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                ],
                MetricValues::Rate {
                    passes,
                    fails,
                    rate,
                } => [
                    (passes + fails).to_string(),
                    format!("{:.6}", rate),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    passes.to_string(),
                    fails.to_string(),
                ],
                MetricValues::Trend {
                    count,
                    avg,
                    min,
                    med,
                    max,
                    p90,
                    p95,
                    p99,
                } => [
                    count.to_string(),
                    String::new(),
                    String::new(),
                    format!("{:.3}", min),
                    format!("{:.3}", max),
                    format!("{:.3}", avg),
                    format!("{:.3}", med),
                    format!("{:.3}", p90),
                    format!("{:.3}", p95),
                    format!("{:.3}", p99),
                    String::new(),
                    String::new(),
                ],
            };
            rows.push(format!(
                "{},{},{}",
                escape(&summary.name),
                summary.kind.as_str(),
                columns.join(",")
            ));
        }
        Ok(rows.join("\n"))
    }
}
