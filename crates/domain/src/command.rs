//! Commands issued by the controller and the results they produce.
//!
//! A [`Command`] is created once per request and never mutated afterwards.
//! Parameters are validated value objects, so a decoded [`CommandRequest`]
//! is always well-formed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::ids::CommandId;
use crate::trade::TradeStatus;

/// Largest amount of coins a single stack can hold.
pub const MAX_CASH_STACK: u64 = 2_147_483_647;

/// Display names are at most 12 characters.
const MAX_PLAYER_NAME_LENGTH: usize = 12;

/// Chatbox input limit.
const MAX_CHAT_MESSAGE_LENGTH: usize = 80;

// ============================================================================
// Parameter value objects
// ============================================================================

/// A validated world number (non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct WorldNumber(u16);

impl WorldNumber {
    pub fn new(number: u16) -> Result<Self, DomainError> {
        if number == 0 {
            return Err(DomainError::validation("World number must be positive"));
        }
        Ok(Self(number))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for WorldNumber {
    type Error = DomainError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorldNumber> for u16 {
    fn from(value: WorldNumber) -> Self {
        value.0
    }
}

impl fmt::Display for WorldNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated player display name (1-12 chars of letters, digits, space, `-`, `_`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerName(String);

impl PlayerName {
    /// Create a new validated player name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the trimmed name is empty, longer
    /// than 12 characters, or contains characters a display name cannot hold.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Player name cannot be empty"));
        }
        if trimmed.chars().count() > MAX_PLAYER_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Player name cannot exceed {} characters",
                MAX_PLAYER_NAME_LENGTH
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_')
        {
            return Err(DomainError::validation(
                "Player name contains invalid characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names compare case-insensitively and treat `_`, `-` and space alike,
    /// matching how the client renders them.
    pub fn matches(&self, other: &str) -> bool {
        fn normalize(c: char) -> char {
            match c {
                '_' | '-' => ' ',
                c => c.to_ascii_lowercase(),
            }
        }
        let other = other.trim();
        self.0.chars().count() == other.chars().count()
            && self
                .0
                .chars()
                .zip(other.chars())
                .all(|(a, b)| normalize(a) == normalize(b))
    }
}

impl TryFrom<String> for PlayerName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerName> for String {
    fn from(value: PlayerName) -> Self {
        value.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated coin amount (0 to [`MAX_CASH_STACK`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct GpAmount(u64);

impl GpAmount {
    pub fn new(amount: u64) -> Result<Self, DomainError> {
        if amount > MAX_CASH_STACK {
            return Err(DomainError::validation(format!(
                "Amount cannot exceed {} coins",
                MAX_CASH_STACK
            )));
        }
        Ok(Self(amount))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for GpAmount {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GpAmount> for u64 {
    fn from(value: GpAmount) -> Self {
        value.0
    }
}

impl fmt::Display for GpAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated chat message (non-empty, at most 80 characters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatMessage(String);

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::validation("Message cannot be empty"));
        }
        if text.chars().count() > MAX_CHAT_MESSAGE_LENGTH {
            return Err(DomainError::validation(format!(
                "Message cannot exceed {} characters",
                MAX_CHAT_MESSAGE_LENGTH
            )));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChatMessage {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChatMessage> for String {
    fn from(value: ChatMessage) -> Self {
        value.0
    }
}

/// Where a chat message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatChannel {
    Public,
    #[default]
    Private,
}

// ============================================================================
// Commands
// ============================================================================

/// The kind of a command, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    HopWorld,
    SendTradeRequest,
    OfferGp,
    AcceptTrade,
    GetTradeStatus,
    SendMessage,
    GetCurrentWorld,
}

impl CommandKind {
    /// Trade-mutating commands need an allow-listed requester.
    pub fn requires_authorization(self) -> bool {
        matches!(
            self,
            Self::SendTradeRequest | Self::OfferGp | Self::AcceptTrade
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HopWorld => "hop_world",
            Self::SendTradeRequest => "send_trade_request",
            Self::OfferGp => "offer_gp",
            Self::AcceptTrade => "accept_trade",
            Self::GetTradeStatus => "get_trade_status",
            Self::SendMessage => "send_message",
            Self::GetCurrentWorld => "get_current_world",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command kind together with its parameters, as decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandRequest {
    HopWorld {
        world: WorldNumber,
    },
    SendTradeRequest {
        rsn: PlayerName,
    },
    OfferGp {
        amount: GpAmount,
    },
    AcceptTrade,
    GetTradeStatus,
    SendMessage {
        message: ChatMessage,
        #[serde(default)]
        channel: ChatChannel,
    },
    GetCurrentWorld,
}

impl CommandRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::HopWorld { .. } => CommandKind::HopWorld,
            Self::SendTradeRequest { .. } => CommandKind::SendTradeRequest,
            Self::OfferGp { .. } => CommandKind::OfferGp,
            Self::AcceptTrade => CommandKind::AcceptTrade,
            Self::GetTradeStatus => CommandKind::GetTradeStatus,
            Self::SendMessage { .. } => CommandKind::SendMessage,
            Self::GetCurrentWorld => CommandKind::GetCurrentWorld,
        }
    }
}

/// One discrete requested action with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: CommandId,
    request: CommandRequest,
    requester: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl Command {
    pub fn new(
        request: CommandRequest,
        requester: Option<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CommandId::new(),
            request,
            requester,
            submitted_at,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.request.kind()
    }

    pub fn request(&self) -> &CommandRequest {
        &self.request
    }

    pub fn requester(&self) -> Option<&str> {
        self.requester.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

// ============================================================================
// Results
// ============================================================================

/// Client-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    Unauthenticated,
    Forbidden,
    ServerBusy,
    Timeout,
    ServerShuttingDown,
    NotFound,
    TradeWindowNotOpen,
    TradeAlreadyInProgress,
    HostActionFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::ServerBusy => "server_busy",
            Self::Timeout => "timeout",
            Self::ServerShuttingDown => "server_shutting_down",
            Self::NotFound => "not_found",
            Self::TradeWindowNotOpen => "trade_window_not_open",
            Self::TradeAlreadyInProgress => "trade_already_in_progress",
            Self::HostActionFailed => "host_action_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed outcome: kind tag plus a short message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<DomainError> for Failure {
    fn from(err: DomainError) -> Self {
        let kind = match &err {
            DomainError::Validation(_) => FailureKind::InvalidRequest,
            DomainError::TradeAlreadyInProgress(_) => FailureKind::TradeAlreadyInProgress,
            DomainError::TradeWindowNotOpen(_) | DomainError::ProtocolViolation(_) => {
                FailureKind::TradeWindowNotOpen
            }
        };
        Self::new(kind, err.to_string())
    }
}

/// Success payload for each command kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandPayload {
    /// Boolean acknowledgement for action commands.
    Done(bool),
    TradeStatus(TradeStatus),
    CurrentWorld { world: u16 },
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(CommandPayload),
    Failure(Failure),
}

/// The single result produced for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub id: CommandId,
    pub outcome: Outcome,
}

impl CommandResult {
    pub fn success(id: CommandId, payload: CommandPayload) -> Self {
        Self {
            id,
            outcome: Outcome::Success(payload),
        }
    }

    pub fn done(id: CommandId) -> Self {
        Self::success(id, CommandPayload::Done(true))
    }

    pub fn failure(id: CommandId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Failure(Failure::new(kind, message)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// The failure kind, if this result is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            Outcome::Failure(failure) => Some(failure.kind),
            Outcome::Success(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_kind_tagged_requests() {
        let hop: CommandRequest =
            serde_json::from_str(r#"{"kind":"hop_world","world":302}"#).unwrap();
        assert_eq!(
            hop,
            CommandRequest::HopWorld {
                world: WorldNumber::new(302).unwrap()
            }
        );

        let accept: CommandRequest = serde_json::from_str(r#"{"kind":"accept_trade"}"#).unwrap();
        assert_eq!(accept.kind(), CommandKind::AcceptTrade);
    }

    #[test]
    fn message_channel_defaults_to_private() {
        let req: CommandRequest =
            serde_json::from_str(r#"{"kind":"send_message","message":"hi"}"#).unwrap();
        match req {
            CommandRequest::SendMessage { channel, .. } => {
                assert_eq!(channel, ChatChannel::Private)
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn rejects_negative_and_oversized_amounts() {
        assert!(serde_json::from_str::<CommandRequest>(r#"{"kind":"offer_gp","amount":-5}"#)
            .is_err());
        assert!(serde_json::from_str::<CommandRequest>(
            r#"{"kind":"offer_gp","amount":2147483648}"#
        )
        .is_err());
        assert!(GpAmount::new(0).is_ok());
        assert!(GpAmount::new(MAX_CASH_STACK).is_ok());
    }

    #[test]
    fn rejects_world_zero() {
        assert!(serde_json::from_str::<CommandRequest>(r#"{"kind":"hop_world","world":0}"#)
            .is_err());
    }

    #[test]
    fn player_name_validation() {
        assert!(PlayerName::new("Bob").is_ok());
        assert_eq!(PlayerName::new("  Zezima ").unwrap().as_str(), "Zezima");
        assert!(PlayerName::new("").is_err());
        assert!(PlayerName::new("ThirteenChars").is_err());
        assert!(PlayerName::new("bob;drop").is_err());
    }

    #[test]
    fn player_name_matches_ignoring_case_and_separators() {
        let name = PlayerName::new("Iron_Bob").unwrap();
        assert!(name.matches("iron bob"));
        assert!(name.matches("IRON-BOB"));
        assert!(!name.matches("Iron Bobby"));
    }

    #[test]
    fn chat_message_length_limit() {
        assert!(ChatMessage::new("a".repeat(80)).is_ok());
        assert!(ChatMessage::new("a".repeat(81)).is_err());
        assert!(ChatMessage::new("   ").is_err());
    }

    #[test]
    fn only_trade_mutations_require_authorization() {
        assert!(CommandKind::SendTradeRequest.requires_authorization());
        assert!(CommandKind::OfferGp.requires_authorization());
        assert!(CommandKind::AcceptTrade.requires_authorization());
        assert!(!CommandKind::HopWorld.requires_authorization());
        assert!(!CommandKind::GetTradeStatus.requires_authorization());
        assert!(!CommandKind::SendMessage.requires_authorization());
        assert!(!CommandKind::GetCurrentWorld.requires_authorization());
    }

    #[test]
    fn domain_errors_map_to_failure_kinds() {
        use crate::trade::TradeState;

        let failure: Failure = DomainError::TradeAlreadyInProgress(TradeState::Requested).into();
        assert_eq!(failure.kind, FailureKind::TradeAlreadyInProgress);

        let failure: Failure = DomainError::TradeWindowNotOpen(TradeState::NoTrade).into();
        assert_eq!(failure.kind, FailureKind::TradeWindowNotOpen);

        let failure: Failure = DomainError::validation("bad").into();
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
    }

    #[test]
    fn commands_keep_caller_and_submission_time() {
        use chrono::TimeZone;

        let at = Utc.with_ymd_and_hms(2025, 6, 15, 10, 30, 0).unwrap();
        let first = Command::new(CommandRequest::AcceptTrade, Some("1001".to_string()), at);
        let second = Command::new(CommandRequest::AcceptTrade, None, at);

        assert_eq!(first.submitted_at(), at);
        assert_eq!(first.requester(), Some("1001"));
        assert_eq!(second.requester(), None);
        assert_ne!(first.id(), second.id());
    }
}
