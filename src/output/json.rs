/// JSON output for scripting.
use crate::contract::ContractReport;
use crate::error::AppError;
use crate::output::{Formatter, ReportFormatter};
use crate::simulator::RunResult;

/// JSON formatter.
#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for JsonFormatter {
    fn format_run(&self, result: &RunResult) -> Result<String, AppError> {
        let mut value = serde_json::to_value(result)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("passed".to_string(), result.passed().into());
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_report(&self, report: &ContractReport) -> Result<String, AppError> {
        let mut value = serde_json::to_value(report)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("passed".to_string(), report.passed().into());
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::{contract_report, run_result};

    #[test]
    fn run_json_carries_summaries_and_verdict() {
        let output = JsonFormatter::new().format_run(&run_result()).expect("format");
        let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");

        assert_eq!(value["scenario"], "full");
        assert_eq!(value["passed"], false);
        assert_eq!(value["metrics"][1]["name"], "http_req_duration");
        assert_eq!(value["metrics"][1]["kind"], "trend");
        assert_eq!(value["metrics"][1]["values"]["type"], "trend");
        assert_eq!(value["metrics"][1]["values"]["p95"], 450.5);
        assert_eq!(value["thresholds"][1]["actual"], serde_json::Value::Null);
    }

    #[test]
    fn report_json_omits_detail_of_passing_assertions() {
        let output = JsonFormatter::new()
            .format_report(&contract_report())
            .expect("format");
        let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");

        assert_eq!(value["passed"], false);
        assert!(value["cases"][0]["assertions"][0].get("detail").is_none());
        assert_eq!(value["cases"][1]["assertions"][0]["detail"], "status was 200");
    }
}
