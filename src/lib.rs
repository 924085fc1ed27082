/// Rampa library - staged load tests and contract checks for a users/transfers API.
pub mod cli;
pub mod contract;
pub mod error;
pub mod http;
pub mod metrics;
pub mod output;
pub mod scenarios;
pub mod simulator;
