/// Transfer creation and listing workloads.
use crate::error::AppError;
use crate::http::{ApiResponse, TransferApi, TransferRequest};
use crate::scenarios::{
    ensure_users, field, login_default, record_group, DEFAULT_USERNAME, SUCCESSFUL_REQUESTS,
};
use crate::simulator::{RunContext, Scenario, VuContext};
use std::sync::Arc;

pub const SUCCESSFUL_TRANSFERS: &str = "successful_transfers";

const TRANSFER_USERS: [&str; 5] = ["julio", "priscila", "maria", "joao", "ana"];

const TRANSFER_PAIRS: [(&str, &str); 5] = [
    ("julio", "priscila"),
    ("priscila", "julio"),
    ("maria", "joao"),
    ("joao", "maria"),
    ("ana", "julio"),
];

/// Setup result shared by the transfer workloads.
#[derive(Debug, Clone, Default)]
pub struct TransferSession {
    pub token: Option<String>,
    /// Transfers created by setup.
    pub seeded: usize,
}

/// Creates a transfer between two seeded users per iteration.
pub struct CreateTransferScenario {
    api: Arc<dyn TransferApi>,
}

impl CreateTransferScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Scenario for CreateTransferScenario {
    type Data = TransferSession;

    fn name(&self) -> &str {
        "create-transfer"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<TransferSession, AppError> {
        ensure_users(self.api.as_ref(), &TRANSFER_USERS).await;
        let token = login_default(self.api.as_ref()).await;
        if token.is_none() {
            tracing::warn!(user = DEFAULT_USERNAME, "could not obtain an auth token");
        }
        Ok(TransferSession { token, seeded: 0 })
    }

    async fn iteration(&self, vu: &mut VuContext, data: &TransferSession) -> Result<(), AppError> {
        let Some(ref token) = data.token else {
            tracing::debug!(vu = vu.id(), "skipping transfer, no auth token");
            return Ok(());
        };

        let (from, to) = TRANSFER_PAIRS[fastrand::usize(..TRANSFER_PAIRS.len())];
        let value = fastrand::u32(10..210) as f64;
        let request = TransferRequest {
            from: from.to_string(),
            to: to.to_string(),
            value,
        };
        let response = self.api.create_transfer(Some(token.as_str()), &request).await;
        let body = response.json_value();

        let passed = vu.check(
            &response,
            &[
                ("POST /transfers - status is 201", &|r: &ApiResponse| r.status == 201),
                ("POST /transfers - response time < 2000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 2000.0
                }),
                ("POST /transfers - has transfer data", &|_: &ApiResponse| {
                    ["from", "to", "value"]
                        .iter()
                        .all(|key| field(&body, key).is_some())
                }),
                ("POST /transfers - correct from user", &|_: &ApiResponse| {
                    field(&body, "from").and_then(|v| v.as_str()) == Some(from)
                }),
                ("POST /transfers - correct to user", &|_: &ApiResponse| {
                    field(&body, "to").and_then(|v| v.as_str()) == Some(to)
                }),
                ("POST /transfers - correct value", &|_: &ApiResponse| {
                    field(&body, "value").and_then(|v| v.as_f64()) == Some(value)
                }),
                ("POST /transfers - has timestamp", &|_: &ApiResponse| {
                    field(&body, "date").is_some()
                }),
            ],
        );

        if !passed {
            tracing::debug!(vu = vu.id(), from, to, value, "transfer attempt failed");
        }
        record_group(vu, "POST /transfers", Some(SUCCESSFUL_TRANSFERS), passed, &response)
    }
}

/// Lists the default user's transfers per iteration.
pub struct GetTransfersScenario {
    api: Arc<dyn TransferApi>,
}

impl GetTransfersScenario {
    pub fn new(api: Arc<dyn TransferApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Scenario for GetTransfersScenario {
    type Data = TransferSession;

    fn name(&self) -> &str {
        "get-transfers"
    }

    async fn setup(&self, _ctx: &RunContext) -> Result<TransferSession, AppError> {
        ensure_users(self.api.as_ref(), &TRANSFER_USERS[..2]).await;

        let Some(token) = login_default(self.api.as_ref()).await else {
            tracing::warn!(user = DEFAULT_USERNAME, "could not obtain an auth token");
            return Ok(TransferSession::default());
        };

        let mut seeded = 0;
        for i in 0..5 {
            let request = TransferRequest {
                from: TRANSFER_USERS[0].to_string(),
                to: TRANSFER_USERS[1].to_string(),
                value: (50 + i * 10) as f64,
            };
            if self.api.create_transfer(Some(token.as_str()), &request).await.status == 201 {
                seeded += 1;
            }
        }
        tracing::info!(seeded, "seeded transfers");

        Ok(TransferSession {
            token: Some(token),
            seeded,
        })
    }

    async fn iteration(&self, vu: &mut VuContext, data: &TransferSession) -> Result<(), AppError> {
        let Some(ref token) = data.token else {
            tracing::debug!(vu = vu.id(), "skipping transfer listing, no auth token");
            return Ok(());
        };

        let response = self.api.list_transfers(Some(token.as_str())).await;
        let body = response.json_value();
        let transfers = body.as_ref().and_then(|b| b.as_array());

        let passed = vu.check(
            &response,
            &[
                ("GET /transfers - status is 200", &|r: &ApiResponse| r.status == 200),
                ("GET /transfers - response time < 1000ms", &|r: &ApiResponse| {
                    r.duration_ms() < 1000.0
                }),
                ("GET /transfers - returns array", &|_: &ApiResponse| transfers.is_some()),
                // An empty list still counts.
                ("GET /transfers - array has transfers", &|_: &ApiResponse| transfers.is_some()),
                ("GET /transfers - transfers have required fields", &|_: &ApiResponse| {
                    transfers.is_some_and(|t| {
                        t.first().map_or(true, |first| {
                            ["from", "to", "value", "date"]
                                .iter()
                                .all(|key| first.get(key).is_some())
                        })
                    })
                }),
                ("GET /transfers - response is valid JSON", &|_: &ApiResponse| body.is_some()),
                ("GET /transfers - requires authentication", &|r: &ApiResponse| r.status != 401),
            ],
        );

        record_group(vu, "GET /transfers", Some(SUCCESSFUL_REQUESTS), passed, &response)
    }
}
