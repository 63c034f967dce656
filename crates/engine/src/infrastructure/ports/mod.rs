//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Host actions (the game client, or the simulated host)
//! - Clock (for testing)

mod host;
mod testing;

pub use host::{HostActions, HostError, HostEvent};
pub use testing::ClockPort;

#[cfg(test)]
pub use host::MockHostActions;

#[cfg(test)]
pub use testing::MockClockPort;
