/// Sequential black-box checks of the users/transfers API.
use crate::contract::fixtures::{ContractFixtures, TransferErrorCase};
use crate::contract::report::{CaseResult, ContractReport};
use crate::http::{ApiResponse, LoginResponse, RegisterRequest, TransferApi};
use crate::scenarios::unique_username;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Message of a 401 when no bearer token is sent.
pub const MISSING_TOKEN_MESSAGE: &str = "Token não fornecido.";

/// Runs the contract cases against one API.
pub struct ContractSuite {
    api: Arc<dyn TransferApi>,
    fixtures: ContractFixtures,
}

impl ContractSuite {
    pub fn new(api: Arc<dyn TransferApi>, fixtures: ContractFixtures) -> Self {
        Self { api, fixtures }
    }

    /// Run every case in order. Failed assertions never stop the suite.
    pub async fn run(&self) -> ContractReport {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let mut cases = Vec::new();

        cases.push(self.register_new_user().await);
        cases.push(self.register_existing_user().await);
        cases.push(self.login_valid().await);
        cases.push(self.login_wrong_password().await);
        cases.push(self.login_unknown_user().await);
        cases.push(self.list_users().await);

        let token = self.token().await;
        cases.push(self.create_transfer(token.as_deref()).await);
        cases.push(self.create_transfer_without_token().await);
        for rejected in &self.fixtures.transfer_errors {
            cases.push(self.create_rejected_transfer(rejected, token.as_deref()).await);
        }
        cases.push(self.create_transfer_payload(token.as_deref()).await);
        cases.push(self.list_transfers(token.as_deref()).await);
        cases.push(self.list_transfers_without_token().await);

        for case in &cases {
            if case.passed() {
                tracing::info!(endpoint = %case.endpoint, case = %case.name, "passed");
            } else {
                for failure in case.failures() {
                    tracing::warn!(
                        endpoint = %case.endpoint,
                        case = %case.name,
                        assertion = %failure.description,
                        detail = failure.detail.as_deref().unwrap_or(""),
                        "assertion failed"
                    );
                }
            }
        }

        ContractReport {
            base_url: self.api.base_url().to_string(),
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            cases,
        }
    }

    async fn token(&self) -> Option<String> {
        let response = self.api.login(&self.fixtures.login).await;
        let token = response.json::<LoginResponse>().ok().map(|l| l.token);
        if token.is_none() {
            tracing::warn!(
                user = %self.fixtures.login.username,
                status = response.status,
                "login failed, authenticated cases will fail"
            );
        }
        token
    }

    async fn register_new_user(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /users/register", "registers a new user");
        let request = RegisterRequest {
            username: unique_username("usuario_teste"),
            password: "senha123".to_string(),
            favorecidos: vec![self.fixtures.login.username.clone()],
        };
        let response = self.api.register(&request).await;
        let body = response.json_value();

        expect_status(&mut case, &response, 201);
        case.expect(
            "echoes the username",
            str_field(&body, "username") == Some(request.username.as_str()),
            || format!("body was {}", response.body),
        );
        case
    }

    async fn register_existing_user(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /users/register", "rejects an existing username");
        let request = RegisterRequest {
            username: self.fixtures.login.username.clone(),
            password: "senha123".to_string(),
            favorecidos: vec![self.fixtures.transfer.to.clone()],
        };
        let response = self.api.register(&request).await;

        expect_status(&mut case, &response, 400);
        expect_error_field(&mut case, &response);
        case
    }

    async fn login_valid(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /users/login", "logs in with valid credentials");
        let response = self.api.login(&self.fixtures.login).await;
        let body = response.json_value();

        expect_status(&mut case, &response, 200);
        case.expect("has a token", str_field(&body, "token").is_some(), || {
            format!("body was {}", response.body)
        });
        self.expect_payload(&mut case, &response, &body);
        case
    }

    async fn login_wrong_password(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /users/login", "rejects a wrong password");
        let mut request = self.fixtures.login.clone();
        request.password = "senha_errada".to_string();
        let response = self.api.login(&request).await;

        expect_status(&mut case, &response, 400);
        expect_error_field(&mut case, &response);
        case
    }

    async fn login_unknown_user(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /users/login", "rejects an unknown user");
        let mut request = self.fixtures.login.clone();
        request.username = self.fixtures.unknown_recipient.clone();
        request.password = "qualquer_senha".to_string();
        let response = self.api.login(&request).await;

        expect_status(&mut case, &response, 400);
        expect_error_field(&mut case, &response);
        case
    }

    async fn list_users(&self) -> CaseResult {
        let mut case = CaseResult::new("GET /users", "lists users");
        let response = self.api.list_users().await;
        let body = response.json_value();

        expect_status(&mut case, &response, 200);
        expect_array(&mut case, &response, &body);
        self.expect_payload(&mut case, &response, &body);
        case
    }

    async fn create_transfer(&self, token: Option<&str>) -> CaseResult {
        let mut case = CaseResult::new("POST /transfers", "creates a valid transfer");
        if !expect_token(&mut case, token) {
            return case;
        }
        let response = self.api.create_transfer(token, &self.fixtures.transfer).await;
        let body = response.json_value();

        expect_status(&mut case, &response, 201);
        let expected = serde_json::to_value(&self.fixtures.transfer).ok();
        let actual = body.as_ref().map(without_date);
        case.expect(
            "body matches the request, ignoring date",
            same_json(actual.as_ref(), expected.as_ref()),
            || format!("body was {}", response.body),
        );
        case
    }

    async fn create_transfer_without_token(&self) -> CaseResult {
        let mut case = CaseResult::new("POST /transfers", "requires a token");
        let response = self.api.create_transfer(None, &self.fixtures.transfer).await;
        expect_missing_token(&mut case, &response);
        case
    }

    async fn create_rejected_transfer(
        &self,
        rejected: &TransferErrorCase,
        token: Option<&str>,
    ) -> CaseResult {
        let mut case = CaseResult::new("POST /transfers", &rejected.name);
        if !expect_token(&mut case, token) {
            return case;
        }
        let response = self.api.create_transfer(token, &rejected.transfer).await;
        let body = response.json_value();

        expect_status(&mut case, &response, rejected.status);
        case.expect(
            &format!("error is {:?}", rejected.error),
            str_field(&body, "error") == Some(rejected.error.as_str()),
            || format!("body was {}", response.body),
        );
        case
    }

    async fn create_transfer_payload(&self, token: Option<&str>) -> CaseResult {
        let mut case = CaseResult::new("POST /transfers", "returns a typed, bounded payload");
        if !expect_token(&mut case, token) {
            return case;
        }
        let response = self.api.create_transfer(token, &self.fixtures.transfer).await;
        let body = response.json_value();

        expect_status(&mut case, &response, 201);
        self.expect_payload(&mut case, &response, &body);
        match body.as_ref() {
            Some(transfer) => expect_transfer_fields(&mut case, transfer, "transfer"),
            None => {
                case.expect("body is JSON", false, || format!("body was {}", response.body));
            }
        }
        case
    }

    async fn list_transfers(&self, token: Option<&str>) -> CaseResult {
        let mut case = CaseResult::new("GET /transfers", "lists transfers when authenticated");
        if !expect_token(&mut case, token) {
            return case;
        }
        let response = self.api.list_transfers(token).await;
        let body = response.json_value();

        expect_status(&mut case, &response, 200);
        expect_array(&mut case, &response, &body);
        self.expect_payload(&mut case, &response, &body);
        if let Some(items) = body.as_ref().and_then(Value::as_array) {
            for (index, item) in items.iter().enumerate() {
                expect_transfer_fields(&mut case, item, &format!("transfer {}", index));
            }
        }
        case
    }

    async fn list_transfers_without_token(&self) -> CaseResult {
        let mut case = CaseResult::new("GET /transfers", "requires a token");
        let response = self.api.list_transfers(None).await;
        expect_missing_token(&mut case, &response);
        case
    }

    /// JSON content type and serialized size under the limit.
    fn expect_payload(&self, case: &mut CaseResult, response: &ApiResponse, body: &Option<Value>) {
        case.expect("content type is application/json", response.is_json(), || {
            format!("content type was {:?}", response.content_type)
        });
        let size = body
            .as_ref()
            .and_then(|b| serde_json::to_string(b).ok())
            .map(|s| s.chars().count());
        let limit = self.fixtures.payload_limit;
        case.expect(
            &format!("payload is shorter than {} characters", limit),
            size.is_some_and(|s| s < limit),
            || format!("payload size was {:?}", size),
        );
    }
}

fn str_field<'a>(body: &'a Option<Value>, key: &str) -> Option<&'a str> {
    body.as_ref()
        .and_then(|b| b.get(key))
        .and_then(Value::as_str)
}

fn without_date(body: &Value) -> Value {
    let mut body = body.clone();
    if let Some(object) = body.as_object_mut() {
        object.remove("date");
    }
    body
}

/// Structural equality that treats `100` and `100.0` as the same number.
fn same_json(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            a.len() == b.len() && a.iter().all(|(k, v)| same_json(Some(v), b.get(k)))
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_json(Some(x), Some(y)))
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn expect_status(case: &mut CaseResult, response: &ApiResponse, status: u16) {
    case.expect(&format!("status is {}", status), response.status == status, || {
        match response.error {
            Some(ref error) => error.clone(),
            None => format!("status was {}", response.status),
        }
    });
}

fn expect_error_field(case: &mut CaseResult, response: &ApiResponse) {
    let body = response.json_value();
    case.expect("body has an error", body.as_ref().is_some_and(|b| b.get("error").is_some()), || {
        format!("body was {}", response.body)
    });
}

fn expect_array(case: &mut CaseResult, response: &ApiResponse, body: &Option<Value>) {
    case.expect("body is an array", body.as_ref().is_some_and(Value::is_array), || {
        format!("body was {}", response.body)
    });
}

fn expect_token(case: &mut CaseResult, token: Option<&str>) -> bool {
    case.expect("login produced a token", token.is_some(), || {
        "login with the fixture credentials failed".to_string()
    });
    token.is_some()
}

fn expect_missing_token(case: &mut CaseResult, response: &ApiResponse) {
    let body = response.json_value();
    expect_status(case, response, 401);
    case.expect(
        "message says the token is missing",
        str_field(&body, "message") == Some(MISSING_TOKEN_MESSAGE),
        || format!("body was {}", response.body),
    );
}

fn expect_transfer_fields(case: &mut CaseResult, transfer: &Value, label: &str) {
    for key in ["from", "to"] {
        case.expect(
            &format!("{} has string {}", label, key),
            transfer.get(key).is_some_and(Value::is_string),
            || format!("{} was {}", label, transfer),
        );
    }
    case.expect(
        &format!("{} has numeric value", label),
        transfer.get("value").is_some_and(Value::is_number),
        || format!("{} was {}", label, transfer),
    );
}
