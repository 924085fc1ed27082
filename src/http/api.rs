/// reqwest-backed client for the users/transfers API.
use crate::error::AppError;
use crate::http::client::{
    ApiResponse, ClientConfig, LoginRequest, RegisterRequest, TransferApi, TransferRequest,
};
use crate::metrics::{MetricsRegistry, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Instant;

/// Client for the users/transfers API.
pub struct BankingApi {
    client: Client,
    config: ClientConfig,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl BankingApi {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            metrics: None,
        })
    }

    /// Record `http_reqs`, `http_req_duration` and `http_req_failed` for
    /// every request into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(mut req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, name: &str, mut req: RequestBuilder) -> ApiResponse {
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let start = Instant::now();
        let response = match req.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match response.text().await {
                    Ok(body) => ApiResponse {
                        status,
                        content_type,
                        body,
                        duration: start.elapsed(),
                        error: None,
                    },
                    Err(e) => ApiResponse {
                        status,
                        content_type,
                        body: String::new(),
                        duration: start.elapsed(),
                        error: Some(format!("Failed to read response body: {}", e)),
                    },
                }
            }
            Err(e) => ApiResponse::transport_error(format!("Request failed: {}", e), start.elapsed()),
        };

        if let Some(ref error) = response.error {
            tracing::debug!(request = name, error = %error, "request failed");
        }
        self.observe(name, &response);
        response
    }

    fn observe(&self, name: &str, response: &ApiResponse) {
        let Some(ref metrics) = self.metrics else {
            return;
        };
        let recorded = metrics
            .add_counter(HTTP_REQS, 1.0)
            .and_then(|_| metrics.add_trend(HTTP_REQ_DURATION, response.duration_ms()))
            .and_then(|_| metrics.add_rate(HTTP_REQ_FAILED, response.is_failure()));
        if let Err(e) = recorded {
            tracing::warn!(request = name, error = %e, "failed to record request metrics");
        }
    }
}

#[async_trait::async_trait]
impl TransferApi for BankingApi {
    async fn register(&self, request: &RegisterRequest) -> ApiResponse {
        let req = self.client.post(self.url("/users/register")).json(request);
        self.send("POST /users/register", req).await
    }

    async fn login(&self, request: &LoginRequest) -> ApiResponse {
        let req = self.client.post(self.url("/users/login")).json(request);
        self.send("POST /users/login", req).await
    }

    async fn list_users(&self) -> ApiResponse {
        let req = self.client.get(self.url("/users"));
        self.send("GET /users", req).await
    }

    async fn create_transfer(&self, token: Option<&str>, request: &TransferRequest) -> ApiResponse {
        let req = Self::authorized(self.client.post(self.url("/transfers")), token).json(request);
        self.send("POST /transfers", req).await
    }

    async fn list_transfers(&self, token: Option<&str>) -> ApiResponse {
        let req = Self::authorized(self.client.get(self.url("/transfers")), token);
        self.send("GET /transfers", req).await
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::{LoginResponse, MessageBody, Transfer};
    use crate::metrics::MetricValues;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn api(server: &MockServer) -> BankingApi {
        BankingApi::new(ClientConfig::new(server.base_url())).expect("client")
    }

    #[tokio::test]
    async fn login_posts_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/users/login")
                    .json_body(json!({"username": "julio", "password": "123456"}));
                then.status(200)
                    .header("content-type", "application/json; charset=utf-8")
                    .json_body(json!({"token": "h.p.s", "user": {"username": "julio", "saldo": 10000}}));
            })
            .await;

        let response = api(&server)
            .login(&LoginRequest::new("julio", "123456"))
            .await;

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert!(response.is_json());
        let body: LoginResponse = response.json().expect("login body");
        assert_eq!(body.token, "h.p.s");
    }

    #[tokio::test]
    async fn transfers_send_bearer_token_only_when_given() {
        let server = MockServer::start_async().await;
        let authorized = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/transfers")
                    .header("authorization", "Bearer abc");
                then.status(200).json_body(json!([
                    {"from": "julio", "to": "priscila", "value": 100, "date": "2025-01-01T00:00:00.000Z"}
                ]));
            })
            .await;
        let anonymous = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/transfers")
                    .matches(|req| {
                        !req.headers
                            .as_ref()
                            .is_some_and(|h| h.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization")))
                    });
                then.status(401)
                    .json_body(json!({"message": "Token não fornecido."}));
            })
            .await;

        let client = api(&server);
        let ok = client.list_transfers(Some("abc")).await;
        let denied = client.list_transfers(None).await;

        authorized.assert_async().await;
        anonymous.assert_async().await;
        let transfers: Vec<Transfer> = ok.json().expect("transfers");
        assert_eq!(transfers[0].to, "priscila");
        assert_eq!(denied.status, 401);
        let body: MessageBody = denied.json().expect("message body");
        assert_eq!(body.message, "Token não fornecido.");
    }

    #[tokio::test]
    async fn records_builtin_http_metrics() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users");
                then.status(200).json_body(json!([]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/users/register");
                then.status(400).json_body(json!({"error": "Usuário já existe"}));
            })
            .await;

        let metrics = Arc::new(MetricsRegistry::with_builtins());
        let client = api(&server).with_metrics(metrics.clone());
        client.list_users().await;
        client.register(&RegisterRequest::new("julio", "123456")).await;

        let elapsed = Duration::from_secs(1);
        assert_eq!(metrics.get(HTTP_REQS).map(|m| m.count()), Some(2.0));
        assert_eq!(metrics.get(HTTP_REQ_DURATION).map(|m| m.count()), Some(2.0));
        match metrics.get(HTTP_REQ_FAILED).map(|m| m.values(elapsed)) {
            Some(MetricValues::Rate { passes, fails, .. }) => assert_eq!((passes, fails), (1, 1)),
            other => panic!("unexpected http_req_failed values {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_status_zero() {
        // Discard port, nothing listens there.
        let config = ClientConfig {
            timeout: Duration::from_secs(2),
            ..ClientConfig::new("http://127.0.0.1:9")
        };
        let metrics = Arc::new(MetricsRegistry::with_builtins());
        let client = BankingApi::new(config)
            .expect("client")
            .with_metrics(metrics.clone());

        let response = client.list_users().await;

        assert_eq!(response.status, 0);
        assert!(response.error.is_some());
        assert!(response.is_failure());
        let failed = metrics
            .get(HTTP_REQ_FAILED)
            .and_then(|m| m.aggregate(&crate::metrics::Aggregation::Rate, Duration::ZERO));
        assert_eq!(failed, Some(1.0));
    }
}
