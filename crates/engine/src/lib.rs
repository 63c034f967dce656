//! Guardian engine library.
//!
//! Command server and execution bridge between the payments bot and the game
//! client.
//!
//! ## Structure
//!
//! - `use_cases/` - Authorization and command orchestration
//! - `bridge/` - Command queue and the host-side executor
//! - `infrastructure/` - Host ports and their implementations
//! - `api/` - HTTP entry points
//! - `app` - Lifecycle (start, stop, host ticks)

pub mod api;
pub mod app;
pub mod bridge;
pub mod config;
pub mod infrastructure;
pub mod use_cases;

pub use app::{Guardian, LifecycleError};
pub use config::GuardianConfig;
