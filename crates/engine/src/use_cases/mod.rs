//! Use cases - request orchestration in front of the execution bridge.

pub mod authorization;
pub mod commands;

pub use authorization::{AuthorizationGuard, GuardError};
pub use commands::{BridgeStatus, CommandService};
