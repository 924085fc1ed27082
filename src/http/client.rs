/// HTTP client abstraction for the users/transfers API.
use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response from an API call.
///
/// Transport failures are not errors at this level: they come back with
/// `status` 0 and `error` set, so a failed request is just a failed outcome.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    /// HTTP status code, 0 when no response was received
    pub status: u16,
    /// Value of the Content-Type header
    pub content_type: Option<String>,
    /// Raw response body
    pub body: String,
    /// Time from sending the request to reading the full body
    pub duration: Duration,
    /// Transport error description
    pub error: Option<String>,
}

impl ApiResponse {
    /// Response for a request that never got an HTTP answer.
    pub fn transport_error(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: 0,
            content_type: None,
            body: String::new(),
            duration,
            error: Some(error.into()),
        }
    }

    /// True for a status of 0 or at least 400.
    pub fn is_failure(&self) -> bool {
        self.status == 0 || self.status >= 400
    }

    /// Response time in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Decode the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_str(&self.body).map_err(|e| {
            AppError::Api(format!(
                "Failed to parse response body (status {}): {}",
                self.status, e
            ))
        })
    }

    /// Decode the body as untyped JSON, `None` when it is not JSON.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// True when the Content-Type header mentions `application/json`.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }
}

/// `POST /users/register` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub favorecidos: Vec<String>,
}

impl RegisterRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            favorecidos: Vec::new(),
        }
    }
}

/// `POST /users/login` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// `POST /transfers` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub value: f64,
}

/// A user as returned by register and list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub saldo: f64,
    #[serde(default)]
    pub favorecidos: Vec<String>,
}

/// Successful login body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

/// User block of a login response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginUser {
    pub username: String,
    pub saldo: f64,
}

/// A stored transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub value: f64,
    pub date: String,
}

/// `400` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `401` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// Operations of the users/transfers API.
#[async_trait::async_trait]
pub trait TransferApi: Send + Sync {
    /// `POST /users/register`
    async fn register(&self, request: &RegisterRequest) -> ApiResponse;

    /// `POST /users/login`
    async fn login(&self, request: &LoginRequest) -> ApiResponse;

    /// `GET /users`
    async fn list_users(&self) -> ApiResponse;

    /// `POST /transfers`, sending `token` as a bearer token when given.
    async fn create_transfer(&self, token: Option<&str>, request: &TransferRequest) -> ApiResponse;

    /// `GET /transfers`, sending `token` as a bearer token when given.
    async fn list_transfers(&self, token: Option<&str>) -> ApiResponse;

    /// Base URL requests go to.
    fn base_url(&self) -> &str;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Additional headers
    pub headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(60),
            headers: Vec::new(),
        }
    }
}
