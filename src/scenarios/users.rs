/// User registration, login and listing workloads.
use crate::error::AppError;
use crate::http::{ApiResponse, LoginRequest, RegisterRequest, TransferApi};
use crate::scenarios::{
    ensure_users, field, login_default, record_group, unique_username, DEFAULT_PASSWORD,
    DEFAULT_USERNAME, SUCCESSFUL_REQUESTS,
};
use crate::simulator::{RunContext, Scenario, VuContext};
use std::sync::Arc;

pub const SUCCESSFUL_REGISTRATIONS: &str = "successful_registrations";
pub const SUCCESSFUL_LOGINS: &str = "successful_logins";

const REGISTER_PREFIXES: [&str; 5] = [
    "perf_user1",
    "perf_user2",
    "perf_user3",
    "perf_user4",
    "perf_user5",
];

/// Registers a uniquely named user per iteration.
pub struct UserRegisterScenario {
    api: Arc<dyn TransferApi>,
}

impl UserRegisterScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Scenario for UserRegisterScenario {
    type Data = ();

    fn name(&self) -> &str {
        "user-register"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<(), AppError> {
        Ok(())
    }

    async fn iteration(&self, vu: &mut VuContext, _data: &()) -> Result<(), AppError> {
        let prefix = REGISTER_PREFIXES[fastrand::usize(..REGISTER_PREFIXES.len())];
        let request = RegisterRequest::new(unique_username(prefix), DEFAULT_PASSWORD);
        let response = self.api.register(&request).await;
        let body = response.json_value();

        let passed = vu.check(
            &response,
            &[
                ("POST /users/register - status is 201", &|r: &ApiResponse| r.status == 201),
                ("POST /users/register - response time < 1500ms", &|r: &ApiResponse| {
                    r.duration_ms() < 1500.0
                }),
                ("POST /users/register - has user data", &|_: &ApiResponse| {
                    field(&body, "username").is_some()
                        && field(&body, "saldo").is_some()
                        && field(&body, "favorecidos").is_some_and(|f| f.is_array())
                }),
                ("POST /users/register - response has correct username", &|_: &ApiResponse| {
                    field(&body, "username")
                        .and_then(|u| u.as_str())
                        .is_some_and(|u| u.contains("perf_user"))
                }),
            ],
        );

        record_group(
            vu,
            "POST /users/register",
            Some(SUCCESSFUL_REGISTRATIONS),
            passed,
            &response,
        )
    }
}

/// Setup result of the login workload.
#[derive(Debug, Clone)]
pub struct LoginReadiness {
    pub user_exists: bool,
}

/// Logs in as one of the seeded users per iteration.
pub struct UserLoginScenario {
    api: Arc<dyn TransferApi>,
}

impl UserLoginScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Scenario for UserLoginScenario {
    type Data = LoginReadiness;

    fn name(&self) -> &str {
        "user-login"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<LoginReadiness, AppError> {
        if login_default(self.api.as_ref()).await.is_some() {
            tracing::info!(user = DEFAULT_USERNAME, "default user available for login");
            return Ok(LoginReadiness { user_exists: true });
        }

        let response = self
            .api
            .register(&RegisterRequest::new(DEFAULT_USERNAME, DEFAULT_PASSWORD))
            .await;
        let user_exists = response.status == 201;
        if user_exists {
            tracing::info!(user = DEFAULT_USERNAME, "default user created for login");
        } else {
            tracing::warn!(
                user = DEFAULT_USERNAME,
                status = response.status,
                "could not create the default user"
            );
        }
        Ok(LoginReadiness { user_exists })
    }

    async fn iteration(&self, vu: &mut VuContext, data: &LoginReadiness) -> Result<(), AppError> {
        if !data.user_exists {
            tracing::debug!(vu = vu.id(), "skipping login, default user unavailable");
            return Ok(());
        }

        let username = if fastrand::bool() {
            DEFAULT_USERNAME
        } else {
            "priscila"
        };
        let response = self
            .api
            .login(&LoginRequest::new(username, DEFAULT_PASSWORD))
            .await;
        let body = response.json_value();
        let token = field(&body, "token").and_then(|t| t.as_str());
        let user = field(&body, "user");

        let passed = vu.check(
            &response,
            &[
                ("POST /users/login - status is 200", &|r: &ApiResponse| r.status == 200),
                ("POST /users/login - response time < 1000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 1000.0
                }),
                ("POST /users/login - has token", &|_: &ApiResponse| {
                    token.is_some_and(|t| !t.is_empty())
                }),
                ("POST /users/login - has user data", &|_: &ApiResponse| {
                    user.is_some_and(|u| u.get("username").is_some() && u.get("saldo").is_some())
                }),
                ("POST /users/login - token is valid JWT format", &|_: &ApiResponse| {
                    token.is_some_and(|t| t.split('.').count() == 3)
                }),
            ],
        );

        record_group(vu, "POST /users/login", Some(SUCCESSFUL_LOGINS), passed, &response)
    }
}

const LISTING_SEED_PREFIXES: [&str; 3] = ["test_user1", "test_user2", "test_user3"];

/// Lists users per iteration.
pub struct GetUsersScenario {
    api: Arc<dyn TransferApi>,
}

impl GetUsersScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Scenario for GetUsersScenario {
    /// Number of users seeded by setup.
    type Data = usize;

    fn name(&self) -> &str {
        "get-users"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<usize, AppError> {
        let usernames: Vec<String> = LISTING_SEED_PREFIXES
            .iter()
            .map(|prefix| unique_username(prefix))
            .collect();
        let refs: Vec<&str> = usernames.iter().map(String::as_str).collect();
        Ok(ensure_users(self.api.as_ref(), &refs).await)
    }

    async fn iteration(&self, vu: &mut VuContext, _data: &usize) -> Result<(), AppError> {
        let response = self.api.list_users().await;
        let body = response.json_value();
        let users = body.as_ref().and_then(|b| b.as_array());

        let passed = vu.check(
            &response,
            &[
                ("GET /users - status is 200", &|r: &ApiResponse| r.status == 200),
                ("GET /users - response time < 500ms", &|r: &ApiResponse| {
                    r.duration_ms() < 500.0
                }),
                ("GET /users - returns array", &|_: &ApiResponse| users.is_some()),
                ("GET /users - array has users", &|_: &ApiResponse| {
                    users.is_some_and(|u| !u.is_empty())
                }),
                ("GET /users - users have required fields", &|_: &ApiResponse| {
                    users.is_some_and(|u| {
                        u.first().map_or(true, |first| {
                            first.get("username").is_some()
                                && first.get("saldo").is_some()
                                && first.get("favorecidos").is_some_and(|f| f.is_array())
                        })
                    })
                }),
                ("GET /users - response is valid JSON", &|_: &ApiResponse| body.is_some()),
            ],
        );

        record_group(vu, "GET /users", Some(SUCCESSFUL_REQUESTS), passed, &response)
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

    fn rate(vu: &VuContext, name: &str) -> (u64, u64) {
        match vu.metrics().get(name).map(|m| m.values(Duration::ZERO)) {
            Some(MetricValues::Rate { passes, fails, .. }) => (passes, fails),
            other => panic!("unexpected values for {}: {:?}", name, other),
        }
    }

    #[tokio::test]
    async fn register_iteration_passes_all_checks() {
        let api = Arc::new(FakeApi::default());
        let scenario = UserRegisterScenario::new(api.clone());
        let (run, mut vu) = ctx();

        scenario.setup(&run).await.expect("setup");
        scenario.iteration(&mut vu, &()).await.expect("iteration");
        scenario.iteration(&mut vu, &()).await.expect("iteration");

        assert_eq!(api.calls_to("register"), 2);
        assert_eq!(rate(&vu, SUCCESSFUL_REGISTRATIONS), (2, 0));
        // `errors` records the failure flag, so successes count as fails.
        assert_eq!(rate(&vu, ERRORS), (0, 2));
        let checks = vu.metrics().check_summaries();
        assert_eq!(checks.len(), 4);
        assert!(checks.iter().all(|c| c.fails == 0));
    }

    #[tokio::test]
    async fn login_setup_registers_missing_user_and_iterations_run() {
        let api = Arc::new(FakeApi::default().with_user("priscila"));
        let scenario = UserLoginScenario::new(api.clone());
        let (run, mut vu) = ctx();

        let data = scenario.setup(&run).await.expect("setup");
        assert!(data.user_exists);
        assert_eq!(api.calls_to("register"), 1);

        for _ in 0..4 {
            scenario.iteration(&mut vu, &data).await.expect("iteration");
        }
        assert_eq!(rate(&vu, SUCCESSFUL_LOGINS), (4, 0));
    }

    #[tokio::test]
    async fn login_iterations_skip_without_user() {
        let api = Arc::new(FakeApi::default().refusing_register());
        let scenario = UserLoginScenario::new(api.clone());
        let (run, mut vu) = ctx();

        let data = scenario.setup(&run).await.expect("setup is not fatal");
        assert!(!data.user_exists);

        scenario.iteration(&mut vu, &data).await.expect("skip");
        assert_eq!(api.calls_to("login"), 1);
        assert!(vu.metrics().get(SUCCESSFUL_LOGINS).is_none());
    }

    #[tokio::test]
    async fn failed_login_feeds_error_rate() {
        let api = Arc::new(
            FakeApi::default()
                .with_user(DEFAULT_USERNAME)
                .with_user("priscila")
                .refusing_login(),
        );
        let scenario = UserLoginScenario::new(api);
        let (_, mut vu) = ctx();

        scenario
            .iteration(&mut vu, &LoginReadiness { user_exists: true })
            .await
            .expect("failed checks are not iteration errors");

        assert_eq!(rate(&vu, ERRORS), (1, 0));
        assert_eq!(rate(&vu, SUCCESSFUL_LOGINS), (0, 1));
    }

    #[tokio::test]
    async fn get_users_seeds_three_users() {
        let api = Arc::new(FakeApi::default());
        let scenario = GetUsersScenario::new(api.clone());
        let (run, mut vu) = ctx();

        let seeded = scenario.setup(&run).await.expect("setup");
        assert_eq!(seeded, 3);

        scenario.iteration(&mut vu, &seeded).await.expect("iteration");
        assert_eq!(rate(&vu, SUCCESSFUL_REQUESTS), (1, 0));
    }

    #[tokio::test]
    async fn empty_user_list_fails_only_the_non_empty_check() {
        let api = Arc::new(FakeApi::default());
        let scenario = GetUsersScenario::new(api);
        let (_, mut vu) = ctx();

        scenario.iteration(&mut vu, &0).await.expect("iteration");

        let checks = vu.metrics().check_summaries();
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| c.fails > 0)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(failed, vec!["GET /users - array has users"]);
        assert_eq!(rate(&vu, ERRORS), (1, 0));
    }
}
