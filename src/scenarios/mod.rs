/// Built-in workloads against the users/transfers API.
pub mod full;
pub mod transfers;
pub mod users;

pub use full::FullApiScenario;
pub use transfers::{CreateTransferScenario, GetTransfersScenario};
pub use users::{GetUsersScenario, UserLoginScenario, UserRegisterScenario};

use crate::error::AppError;
use crate::http::{ApiResponse, LoginRequest, LoginResponse, RegisterRequest, TransferApi};
use crate::metrics::{ThresholdSet, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
use crate::simulator::{SimulatorConfig, Stage, ThinkTime, VuContext};
use std::time::Duration;

/// Account every scenario authenticates as.
pub const DEFAULT_USERNAME: &str = "julio";
pub const DEFAULT_PASSWORD: &str = "123456";

/// Rate fed with the failure of every check group.
pub const ERRORS: &str = "errors";

/// The built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinScenario {
    Full,
    UserRegister,
    UserLogin,
    GetUsers,
    CreateTransfer,
    GetTransfers,
}

impl BuiltinScenario {
    pub fn all() -> &'static [BuiltinScenario] {
        &[
            BuiltinScenario::Full,
            BuiltinScenario::UserRegister,
            BuiltinScenario::UserLogin,
            BuiltinScenario::GetUsers,
            BuiltinScenario::CreateTransfer,
            BuiltinScenario::GetTransfers,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinScenario::Full => "full",
            BuiltinScenario::UserRegister => "user-register",
            BuiltinScenario::UserLogin => "user-login",
            BuiltinScenario::GetUsers => "get-users",
            BuiltinScenario::CreateTransfer => "create-transfer",
            BuiltinScenario::GetTransfers => "get-transfers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinScenario::Full => "Register, login, list users, create and list transfers",
            BuiltinScenario::UserRegister => "Register uniquely named users",
            BuiltinScenario::UserLogin => "Log in as the seeded users",
            BuiltinScenario::GetUsers => "List users",
            BuiltinScenario::CreateTransfer => "Create transfers between seeded users",
            BuiltinScenario::GetTransfers => "List transfers of the default user",
        }
    }

    /// Custom rate reporting the share of fully passing check groups.
    pub fn success_rate(&self) -> Option<&'static str> {
        match self {
            BuiltinScenario::Full => None,
            BuiltinScenario::UserRegister => Some(users::SUCCESSFUL_REGISTRATIONS),
            BuiltinScenario::UserLogin => Some(users::SUCCESSFUL_LOGINS),
            BuiltinScenario::GetUsers | BuiltinScenario::GetTransfers => {
                Some(SUCCESSFUL_REQUESTS)
            }
            BuiltinScenario::CreateTransfer => Some(transfers::SUCCESSFUL_TRANSFERS),
        }
    }

    /// Stages, thresholds and pacing the scenario runs with unless overridden.
    pub fn default_config(&self) -> SimulatorConfig {
        let (stages, p95_ms, failed_rate, sleep) = match self {
            BuiltinScenario::Full => (
                vec![
                    stage(30, 10),
                    stage(60, 10),
                    stage(30, 20),
                    stage(60, 20),
                    stage(30, 0),
                ],
                2000,
                "0.1",
                Duration::from_secs(1),
            ),
            BuiltinScenario::UserRegister => (two_step(5, 10), 1500, "0.05", Duration::from_secs(1)),
            BuiltinScenario::UserLogin => (two_step(10, 20), 1000, "0.05", Duration::from_secs(1)),
            BuiltinScenario::GetUsers => (two_step(15, 30), 500, "0.01", Duration::from_millis(500)),
            BuiltinScenario::CreateTransfer => {
                (two_step(5, 10), 2000, "0.2", Duration::from_secs(2))
            }
            BuiltinScenario::GetTransfers => (two_step(10, 20), 1000, "0.1", Duration::from_secs(1)),
        };

        let mut config = SimulatorConfig::new(stages);
        config.think_time = Some(ThinkTime::fixed(sleep));
        config.thresholds = vec![
            ThresholdSet {
                metric: HTTP_REQ_DURATION.to_string(),
                expressions: vec![format!("p(95)<{}", p95_ms)],
            },
            ThresholdSet {
                metric: HTTP_REQ_FAILED.to_string(),
                expressions: vec![format!("rate<{}", failed_rate)],
            },
        ];
        config
    }
}

/// Rate shared by the listing scenarios.
pub const SUCCESSFUL_REQUESTS: &str = "successful_requests";

fn stage(secs: u64, target: usize) -> Stage {
    Stage::new(Duration::from_secs(secs), target)
}

/// 30s ramp to `low`, hold 2m, 30s ramp to `high`, hold 2m, 30s ramp down.
fn two_step(low: usize, high: usize) -> Vec<Stage> {
    vec![
        stage(30, low),
        stage(120, low),
        stage(30, high),
        stage(120, high),
        stage(30, 0),
    ]
}

/// Username that will not collide with earlier runs or other virtual users.
pub(crate) fn unique_username(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        fastrand::u32(0..10_000)
    )
}

/// Feed the outcome of a check group into `errors` and the optional success
/// rate, logging the response when any check failed.
pub(crate) fn record_group(
    vu: &VuContext,
    request: &str,
    success_rate: Option<&str>,
    passed: bool,
    response: &ApiResponse,
) -> Result<(), AppError> {
    vu.add_rate(ERRORS, !passed)?;
    if let Some(rate) = success_rate {
        vu.add_rate(rate, passed)?;
    }
    if !passed {
        tracing::debug!(
            vu = vu.id(),
            request,
            status = response.status,
            body = %response.body,
            "check group failed"
        );
    }
    Ok(())
}

/// Field `key` of a JSON object body.
pub(crate) fn field<'a>(
    body: &'a Option<serde_json::Value>,
    key: &str,
) -> Option<&'a serde_json::Value> {
    body.as_ref().and_then(|v| v.get(key))
}

/// Log in as the default user and return the token.
pub(crate) async fn login_default(api: &dyn TransferApi) -> Option<String> {
    let response = api
        .login(&LoginRequest::new(DEFAULT_USERNAME, DEFAULT_PASSWORD))
        .await;
    if response.status != 200 {
        return None;
    }
    match response.json::<LoginResponse>() {
        Ok(body) => Some(body.token),
        Err(e) => {
            tracing::warn!(error = %e, "login succeeded without a readable token");
            None
        }
    }
}

/// Log in as the default user, registering it first when login fails.
pub(crate) async fn login_or_register(api: &dyn TransferApi) -> Option<String> {
    if let Some(token) = login_default(api).await {
        tracing::info!(user = DEFAULT_USERNAME, "logged in");
        return Some(token);
    }

    let register = api
        .register(&RegisterRequest::new(DEFAULT_USERNAME, DEFAULT_PASSWORD))
        .await;
    if register.status != 201 {
        tracing::warn!(
            user = DEFAULT_USERNAME,
            status = register.status,
            "could not register the default user"
        );
        return None;
    }

    let token = login_default(api).await;
    if token.is_some() {
        tracing::info!(user = DEFAULT_USERNAME, "registered and logged in");
    }
    token
}

/// Register each of `usernames` with the default password, returning how
/// many were newly created.
pub(crate) async fn ensure_users(api: &dyn TransferApi, usernames: &[&str]) -> usize {
    let mut created = 0;
    for username in usernames {
        let response = api
            .register(&RegisterRequest::new(*username, DEFAULT_PASSWORD))
            .await;
        if response.status == 201 {
            created += 1;
        }
    }
    tracing::info!(created, total = usernames.len(), "users created or verified");
    created
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stand-in for the API.
    use super::*;
    use crate::http::TransferRequest;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    fn json(status: u16, body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: body.to_string(),
            duration: Duration::from_millis(20),
            error: None,
        }
    }

    /// Minimal stateful fake of the API.
    #[derive(Default)]
    pub struct FakeApi {
        users: Mutex<HashMap<String, String>>,
        transfers: Mutex<Vec<serde_json::Value>>,
        calls: Mutex<Vec<String>>,
        refuse_login: bool,
        refuse_register: bool,
    }

    impl FakeApi {
        pub fn refusing_login(mut self) -> Self {
            self.refuse_login = true;
            self
        }

        pub fn refusing_register(mut self) -> Self {
            self.refuse_register = true;
            self
        }

        pub fn with_user(self, username: &str) -> Self {
            self.users
                .lock()
                .insert(username.to_string(), DEFAULT_PASSWORD.to_string());
            self
        }

        pub fn calls_to(&self, request: &str) -> usize {
            self.calls.lock().iter().filter(|c| *c == request).count()
        }

        pub fn transfer_count(&self) -> usize {
            self.transfers.lock().len()
        }

        fn call(&self, request: &str) {
            self.calls.lock().push(request.to_string());
        }
    }

    #[async_trait::async_trait]
    impl TransferApi for FakeApi {
        async fn register(&self, request: &RegisterRequest) -> ApiResponse {
            self.call("register");
            let mut users = self.users.lock();
            if self.refuse_register || users.contains_key(&request.username) {
                return json(400, serde_json::json!({"error": "Usuário já existe"}));
            }
            users.insert(request.username.clone(), request.password.clone());
            json(
                201,
                serde_json::json!({
                    "username": request.username,
                    "saldo": 10000,
                    "favorecidos": request.favorecidos,
                }),
            )
        }

        async fn login(&self, request: &LoginRequest) -> ApiResponse {
            self.call("login");
            let users = self.users.lock();
            match users.get(&request.username) {
                Some(password) if !self.refuse_login && *password == request.password => json(
                    200,
                    serde_json::json!({
                        "token": "header.payload.signature",
                        "user": {"username": request.username, "saldo": 10000},
                    }),
                ),
                _ => json(400, serde_json::json!({"error": "Login ou senha inválidos"})),
            }
        }

        async fn list_users(&self) -> ApiResponse {
            self.call("list_users");
            let users: Vec<_> = self
                .users
                .lock()
                .keys()
                .map(|u| serde_json::json!({"username": u, "saldo": 10000, "favorecidos": []}))
                .collect();
            json(200, serde_json::Value::Array(users))
        }

        async fn create_transfer(
            &self,
            token: Option<&str>,
            request: &TransferRequest,
        ) -> ApiResponse {
            self.call("create_transfer");
            if token.is_none() {
                return json(401, serde_json::json!({"message": "Token não fornecido."}));
            }
            let users = self.users.lock();
            if !users.contains_key(&request.from) || !users.contains_key(&request.to) {
                return json(
                    400,
                    serde_json::json!({"error": "Usuário remetente ou destinatário não encontrado"}),
                );
            }
            let transfer = serde_json::json!({
                "from": request.from,
                "to": request.to,
                "value": request.value,
                "date": "2025-01-01T00:00:00.000Z",
            });
            self.transfers.lock().push(transfer.clone());
            json(201, transfer)
        }

        async fn list_transfers(&self, token: Option<&str>) -> ApiResponse {
            self.call("list_transfers");
            if token.is_none() {
                return json(401, serde_json::json!({"message": "Token não fornecido."}));
            }
            json(200, serde_json::Value::Array(self.transfers.lock().clone()))
        }

        fn base_url(&self) -> &str {
            "http://fake"
        }
    }
}
