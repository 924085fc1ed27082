/// Black-box contract checks of the users/transfers API.
pub mod fixtures;
pub mod report;
pub mod suite;

pub use fixtures::{ContractFixtures, TransferErrorCase, UNKNOWN_USER_ERROR};
pub use report::{Assertion, CaseResult, ContractReport};
pub use suite::{ContractSuite, MISSING_TOKEN_MESSAGE};
