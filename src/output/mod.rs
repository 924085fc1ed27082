/// Renderings of run results and contract reports.
pub mod csv;
pub mod json;
pub mod markdown;
pub mod prometheus;
pub mod text;

pub use csv::CsvFormatter;
pub use json::JsonFormatter;
pub use markdown::MarkdownFormatter;
pub use prometheus::PrometheusFormatter;
pub use text::TextFormatter;

use crate::contract::ContractReport;
use crate::error::AppError;
use crate::simulator::RunResult;

/// Renders the outcome of a load run.
pub trait Formatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError>;
}

/// Renders a contract report.
pub trait ReportFormatter {
    fn format_report(&self, report: &ContractReport) -> Result<String, AppError>;
}

/// Format a number the way the summaries print it: integers without a
/// fraction, everything else with two decimals.
pub(crate) fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_drop_trailing_zeros_only_for_integers() {
        assert_eq!(number(2000.0), "2000");
        assert_eq!(number(0.1), "0.10");
        assert_eq!(number(450.456), "450.46");
    }
}
