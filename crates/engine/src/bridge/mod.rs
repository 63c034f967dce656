//! Execution bridge between request handlers and the host's tick loop.
//!
//! Many producers submit through [`CommandSubmitter`]; the single consumer is
//! the [`HostExecutor`], driven by the host. Each command's result comes back
//! through its own [`PendingSlot`].

mod executor;
mod queue;

pub use executor::{BridgeSettings, HostExecutor, TickReport};
pub use queue::{CommandSubmitter, InFlight, PendingSlot, SubmitError};
