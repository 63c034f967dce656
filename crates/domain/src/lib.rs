//! Domain types for the GP guardian bridge: commands and their results,
//! the trade negotiation state machine, and the authorization list.

pub mod authorization;
pub mod command;
pub mod error;
pub mod ids;
pub mod trade;
pub mod world;

pub use authorization::AuthorizationList;
pub use command::{
    ChatChannel, ChatMessage, Command, CommandKind, CommandPayload, CommandRequest,
    CommandResult, Failure, FailureKind, GpAmount, Outcome, PlayerName, WorldNumber,
    MAX_CASH_STACK,
};
pub use error::DomainError;
pub use ids::CommandId;
pub use trade::{TradeSession, TradeState, TradeStatus};
pub use world::WorldInfo;
