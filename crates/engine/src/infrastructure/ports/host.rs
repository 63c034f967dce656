//! Host action adapter: the capabilities the execution bridge calls into.
//!
//! Every method runs on the host's own execution context, once per scheduled
//! command. Calls are expected to be fast and non-suspending. Confirmation of
//! long-running effects (the trade actually completing) arrives later as a
//! [`HostEvent`], not through the return value.

use guardian_domain::{ChatChannel, ChatMessage, GpAmount, PlayerName, WorldInfo, WorldNumber};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Trade window closed")]
    WindowClosed,
    #[error("Host action failed: {0}")]
    Failed(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait HostActions {
    /// World list as currently known to the host.
    fn worlds(&self) -> Vec<WorldInfo>;

    /// The world the player is logged in to, if any.
    fn current_world(&self) -> Option<WorldNumber>;

    fn hop_world(&mut self, world: WorldNumber) -> Result<(), HostError>;

    /// Fails with [`HostError::NotFound`] when the player is not nearby.
    fn send_trade_request(&mut self, player: &PlayerName) -> Result<(), HostError>;

    /// Fails with [`HostError::WindowClosed`] when no trade interface is open.
    fn offer_gp(&mut self, amount: GpAmount) -> Result<(), HostError>;

    /// Fails with [`HostError::WindowClosed`] when no trade interface is open.
    fn accept_trade(&mut self) -> Result<(), HostError>;

    fn send_message(&mut self, message: &ChatMessage, channel: ChatChannel)
        -> Result<(), HostError>;

    fn capture_screenshot(&mut self, label: &str) -> Result<(), HostError>;
}

/// Trade events reported by the host's event subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    TradeWindowOpened { partner: String },
    TradeWindowClosed,
    TradeOfferChanged { amount: GpAmount },
    PartnerAccepted,
    PartnerDeclined,
}
