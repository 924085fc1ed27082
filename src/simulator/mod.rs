#![allow(clippy::module_inception)]
/// Staged virtual-user executor.
pub mod config;
pub mod scenario;
pub mod schedule;
pub mod simulator;

pub use config::{parse_duration, RunFile, SimulatorConfig, Stage, ThinkTime};
pub use scenario::{RunContext, Scenario, VuContext};
pub use schedule::StagePlan;
pub use simulator::{RunResult, Simulator};
