/// Outcome of a contract suite run.
use serde::Serialize;

/// One assertion made about a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assertion {
    pub description: String,
    pub passed: bool,
    /// What was observed when the assertion failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Assertions made by one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    /// Endpoint under test, e.g. `POST /transfers`
    pub endpoint: String,
    pub name: String,
    pub assertions: Vec<Assertion>,
}

impl CaseResult {
    pub fn new(endpoint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            name: name.into(),
            assertions: Vec::new(),
        }
    }

    /// Record an assertion. `detail` is only evaluated when it failed.
    pub fn expect<F>(&mut self, description: &str, passed: bool, detail: F) -> &mut Self
    where
        F: FnOnce() -> String,
    {
        self.assertions.push(Assertion {
            description: description.to_string(),
            passed,
            detail: if passed { None } else { Some(detail()) },
        });
        self
    }

    pub fn passed(&self) -> bool {
        self.assertions.iter().all(|a| a.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(|a| !a.passed)
    }
}

/// Results of every case, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct ContractReport {
    pub base_url: String,
    /// When the suite started
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_secs: f64,
    pub cases: Vec<CaseResult>,
}

impl ContractReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseResult::passed)
    }

    pub fn passed_cases(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    pub fn failed_cases(&self) -> usize {
        self.cases.len() - self.passed_cases()
    }

    pub fn case(&self, name: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.name == name)
    }
}
