/// Request payloads the contract suite sends.
use crate::error::ParseError;
use crate::http::{LoginRequest, TransferRequest};
use serde::Deserialize;
use std::path::Path;

/// Error of a 400 when a transfer names an unknown user.
pub const UNKNOWN_USER_ERROR: &str = "Usuário remetente ou destinatário não encontrado";

/// A transfer the API must refuse, with the status and `error` it answers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferErrorCase {
    pub name: String,
    pub transfer: TransferRequest,
    pub status: u16,
    pub error: String,
}

/// Fixture data, overridable from a TOML file.
///
/// ```toml
/// unknown_recipient = "ghost"
/// payload_limit = 2000
///
/// [login]
/// username = "julio"
/// password = "123456"
///
/// [transfer]
/// from = "julio"
/// to = "priscila"
/// value = 100
///
/// [[transfer_errors]]
/// name = "rejects an unknown sender"
/// status = 400
/// error = "Usuário remetente ou destinatário não encontrado"
/// transfer = { from = "ghost", to = "priscila", value = 100 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractFixtures {
    /// Credentials of an existing account
    pub login: LoginRequest,
    /// A transfer the API accepts
    pub transfer: TransferRequest,
    /// Username that does not exist
    pub unknown_recipient: String,
    /// Upper bound, exclusive, on serialized response bodies
    pub payload_limit: usize,
    /// Rejected transfers, one contract case each. A file that sets this
    /// replaces the whole list.
    pub transfer_errors: Vec<TransferErrorCase>,
}

impl Default for ContractFixtures {
    fn default() -> Self {
        let transfer = TransferRequest {
            from: "julio".to_string(),
            to: "priscila".to_string(),
            value: 100.0,
        };
        let unknown_recipient = "usuario_inexistente".to_string();
        let transfer_errors = vec![TransferErrorCase {
            name: "rejects an unknown recipient".to_string(),
            transfer: TransferRequest {
                to: unknown_recipient.clone(),
                ..transfer.clone()
            },
            status: 400,
            error: UNKNOWN_USER_ERROR.to_string(),
        }];
        Self {
            login: LoginRequest::new("julio", "123456"),
            transfer,
            unknown_recipient,
            payload_limit: 2000,
            transfer_errors,
        }
    }
}

impl ContractFixtures {
    /// Load fixtures from a TOML file. Keys left out keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ParseError> {
        Ok(toml::from_str(content)?)
    }
}
