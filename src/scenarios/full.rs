/// Mixed workload touching every endpoint.
use crate::error::AppError;
use crate::http::{ApiResponse, LoginRequest, RegisterRequest, TransferApi, TransferRequest};
use crate::scenarios::{
    field, login_or_register, record_group, unique_username, DEFAULT_PASSWORD, DEFAULT_USERNAME,
};
use crate::simulator::{RunContext, Scenario, VuContext};
use std::sync::Arc;

const REGISTER_PREFIXES: [&str; 5] = ["user1", "user2", "user3", "user4", "user5"];

/// Setup result of the mixed workload.
#[derive(Debug, Clone, Default)]
pub struct FullSession {
    pub token: Option<String>,
}

/// Registers, logs in, lists users, then creates and lists transfers when
/// setup obtained a token.
pub struct FullApiScenario {
    api: Arc<dyn TransferApi>,
}

impl FullApiScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }

    async fn register(&self, vu: &VuContext) -> Result<(), AppError> {
        let prefix = REGISTER_PREFIXES[fastrand::usize(..REGISTER_PREFIXES.len())];
        let response = self
            .api
            .register(&RegisterRequest::new(unique_username(prefix), DEFAULT_PASSWORD))
            .await;
        let body = response.json_value();
        let passed = vu.check(
            &response,
            &[
                ("POST /users/register - status is 201", &|r: &ApiResponse| r.status == 201),
                ("POST /users/register - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("POST /users/register - has user data", &|_: &ApiResponse| {
                    field(&body, "username").is_some()
                }),
            ],
        );
        record_group(vu, "POST /users/register", None, passed, &response)
    }

    async fn login(&self, vu: &VuContext) -> Result<(), AppError> {
        let response = self
            .api
            .login(&LoginRequest::new(DEFAULT_USERNAME, DEFAULT_PASSWORD))
            .await;
        let body = response.json_value();
        let passed = vu.check(
            &response,
            &[
                ("POST /users/login - status is 200", &|r: &ApiResponse| r.status == 200),
                ("POST /users/login - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("POST /users/login - has token", &|_: &ApiResponse| {
                    field(&body, "token").is_some()
                }),
            ],
        );
        record_group(vu, "POST /users/login", None, passed, &response)
    }

    async fn list_users(&self, vu: &VuContext) -> Result<(), AppError> {
        let response = self.api.list_users().await;
        let body = response.json_value();
        let passed = vu.check(
            &response,
            &[
                ("GET /users - status is 200", &|r: &ApiResponse| r.status == 200),
                ("GET /users - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("GET /users - returns array", &|_: &ApiResponse| {
                    body.as_ref().is_some_and(|b| b.is_array())
                }),
            ],
        );
        record_group(vu, "GET /users", None, passed, &response)
    }

    async fn create_transfer(&self, vu: &VuContext, token: &str) -> Result<(), AppError> {
        let request = TransferRequest {
            from: DEFAULT_USERNAME.to_string(),
            to: "priscila".to_string(),
            value: fastrand::u32(1..=100) as f64,
        };
        let response = self.api.create_transfer(Some(token), &request).await;
        let body = response.json_value();
        let passed = vu.check(
            &response,
            &[
                ("POST /transfers - status is 201", &|r: &ApiResponse| r.status == 201),
                ("POST /transfers - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("POST /transfers - has transfer data", &|_: &ApiResponse| {
                    field(&body, "from").is_some() && field(&body, "to").is_some()
                }),
            ],
        );
        record_group(vu, "POST /transfers", None, passed, &response)
    }

    async fn list_transfers(&self, vu: &VuContext, token: &str) -> Result<(), AppError> {
        let response = self.api.list_transfers(Some(token)).await;
        let body = response.json_value();
        let passed = vu.check(
            &response,
            &[
                ("GET /transfers - status is 200", &|r: &ApiResponse| r.status == 200),
                ("GET /transfers - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("GET /transfers - returns array", &|_: &ApiResponse| {
                    body.as_ref().is_some_and(|b| b.is_array())
                }),
            ],
        );
        record_group(vu, "GET /transfers", None, passed, &response)
    }
}

#[async_trait::async_trait]
impl Scenario for FullApiScenario {
    type Data = FullSession;

    fn name(&self) -> &str {
        "full"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<FullSession, AppError> {
        tracing::info!(base_url = self.api.base_url(), "preparing mixed workload");
        let token = login_or_register(self.api.as_ref()).await;
        if token.is_none() {
            tracing::warn!("no auth token, transfer requests will be skipped");
        }
        Ok(FullSession { token })
    }

    async fn iteration(&self, vu: &mut VuContext, data: &FullSession) -> Result<(), AppError> {
        self.register(vu).await?;
        self.login(vu).await?;
        self.list_users(vu).await?;

        match data.token.as_deref() {
            Some(token) => {
                self.create_transfer(vu, token).await?;
                self.list_transfers(vu, token).await?;
            }
            None => tracing::debug!(vu = vu.id(), "skipping transfer requests, no auth token"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricValues, MetricsRegistry};
    use crate::scenarios::testing::FakeApi;
    use crate::scenarios::ERRORS;
    use std::time::Duration;

    fn ctx() -> (RunContext, VuContext) {
        let metrics = Arc::new(MetricsRegistry::with_builtins());
        (
            RunContext {
                metrics: metrics.clone(),
            },
            VuContext::new(1, metrics),
        )
    }

    #[tokio::test]
    async fn iteration_hits_every_endpoint_with_token() {
        let api = Arc::new(FakeApi::default().with_user("priscila"));
        let scenario = FullApiScenario::new(api.clone());
        let (run, mut vu) = ctx();

        let session = scenario.setup(&run).await.expect("setup");
        assert!(session.token.is_some());
        scenario.iteration(&mut vu, &session).await.expect("iteration");

        for call in ["list_users", "create_transfer", "list_transfers"] {
            assert_eq!(api.calls_to(call), 1, "{call}");
        }
        match vu.metrics().get(ERRORS).map(|m| m.values(Duration::ZERO)) {
            Some(MetricValues::Rate { passes, fails, rate }) => {
                assert_eq!((passes, fails), (0, 5));
                assert_eq!(rate, 0.0);
            }
            other => panic!("unexpected errors values {:?}", other),
        }
    }

    #[tokio::test]
    async fn transfers_are_skipped_without_token() {
        let api = Arc::new(FakeApi::default().refusing_register());
        let scenario = FullApiScenario::new(api.clone());
        let (run, mut vu) = ctx();

        let session = scenario.setup(&run).await.expect("setup is not fatal");
        assert!(session.token.is_none());
        scenario.iteration(&mut vu, &session).await.expect("iteration");

        assert_eq!(api.calls_to("create_transfer"), 0);
        assert_eq!(api.calls_to("list_transfers"), 0);
        assert_eq!(api.calls_to("list_users"), 1);
    }
}
