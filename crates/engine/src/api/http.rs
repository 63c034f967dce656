//! HTTP routes.
//!
//! One route per command kind (the paths the bot already calls), plus
//! `POST /commands` taking any kind-tagged command. Every command response
//! has the same envelope:
//!
//! ```text
//! {"id": "...", "ok": true,  "result": <payload>}
//! {"id": "...", "ok": false, "error": {"kind": "forbidden", "message": "..."}}
//! ```
//!
//! Object payloads are also flattened into the envelope, so `GET /world`
//! answers `{"id", "ok": true, "result": {"world": 302}, "world": 302}`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use guardian_domain::{
    ChatChannel, ChatMessage, CommandId, CommandPayload, CommandRequest, CommandResult, Failure,
    FailureKind, GpAmount, Outcome, PlayerName, WorldNumber,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use super::requester::Requester;
use crate::use_cases::{BridgeStatus, CommandService};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<CommandService>> {
    Router::new()
        .route("/", get(health))
        .route("/status", get(status))
        .route("/world", get(current_world))
        .route("/world/hop", post(hop_world))
        .route("/trade/request", post(send_trade_request))
        .route("/trade/offer", post(offer_gp))
        .route("/trade/accept", post(accept_trade))
        .route("/trade/status", get(trade_status))
        .route("/chat/send", post(send_message))
        .route("/commands", post(submit_command))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(flatten)]
    bridge: BridgeStatus,
}

async fn status(State(service): State<Arc<CommandService>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        bridge: service.status(),
    })
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Deserialize)]
struct HopWorldBody {
    world: WorldNumber,
}

#[derive(Debug, Deserialize)]
struct TradeRequestBody {
    rsn: PlayerName,
}

#[derive(Debug, Deserialize)]
struct OfferBody {
    amount: GpAmount,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: ChatMessage,
    #[serde(default)]
    channel: Option<ChatChannel>,
    /// Older clients send `"public": true|false` instead of a channel.
    #[serde(default)]
    public: Option<bool>,
}

impl ChatBody {
    fn channel(&self) -> ChatChannel {
        match (self.channel, self.public) {
            (Some(channel), _) => channel,
            (None, Some(true)) => ChatChannel::Public,
            (None, _) => ChatChannel::Private,
        }
    }
}

async fn current_world(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
) -> CommandResponse {
    run(&service, CommandRequest::GetCurrentWorld, requester).await
}

async fn hop_world(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<CommandResponse, ApiError> {
    let HopWorldBody { world } = decode(&body)?;
    Ok(run(&service, CommandRequest::HopWorld { world }, requester).await)
}

async fn send_trade_request(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<CommandResponse, ApiError> {
    let TradeRequestBody { rsn } = decode(&body)?;
    Ok(run(&service, CommandRequest::SendTradeRequest { rsn }, requester).await)
}

async fn offer_gp(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<CommandResponse, ApiError> {
    let OfferBody { amount } = decode(&body)?;
    Ok(run(&service, CommandRequest::OfferGp { amount }, requester).await)
}

async fn accept_trade(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
) -> CommandResponse {
    run(&service, CommandRequest::AcceptTrade, requester).await
}

async fn trade_status(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
) -> CommandResponse {
    run(&service, CommandRequest::GetTradeStatus, requester).await
}

async fn send_message(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<CommandResponse, ApiError> {
    let body: ChatBody = decode(&body)?;
    let channel = body.channel();
    let request = CommandRequest::SendMessage {
        message: body.message,
        channel,
    };
    Ok(run(&service, request, requester).await)
}

async fn submit_command(
    State(service): State<Arc<CommandService>>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<CommandResponse, ApiError> {
    let request: CommandRequest = decode(&body)?;
    Ok(run(&service, request, requester).await)
}

async fn run(
    service: &CommandService,
    request: CommandRequest,
    requester: Option<String>,
) -> CommandResponse {
    CommandResponse(service.execute(request, requester).await)
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
struct Envelope {
    id: Option<CommandId>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<CommandPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
    /// Object payload fields, repeated next to `id`/`ok` for clients that
    /// read `world` or `state` from the top level.
    #[serde(flatten)]
    fields: Map<String, Value>,
}

fn top_level_fields(payload: &CommandPayload) -> Map<String, Value> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    }
}

/// A command result rendered as an HTTP response.
#[derive(Debug)]
pub struct CommandResponse(pub CommandResult);

impl IntoResponse for CommandResponse {
    fn into_response(self) -> Response {
        let CommandResult { id, outcome } = self.0;
        match outcome {
            Outcome::Success(payload) => (
                StatusCode::OK,
                Json(Envelope {
                    id: Some(id),
                    ok: true,
                    fields: top_level_fields(&payload),
                    result: Some(payload),
                    error: None,
                }),
            )
                .into_response(),
            Outcome::Failure(failure) => (
                status_for(failure.kind),
                Json(Envelope {
                    id: Some(id),
                    ok: false,
                    result: None,
                    error: Some(failure),
                    fields: Map::new(),
                }),
            )
                .into_response(),
        }
    }
}

/// Errors raised before a command exists.
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(Envelope {
                    id: None,
                    ok: false,
                    result: None,
                    error: Some(Failure::new(FailureKind::InvalidRequest, msg)),
                    fields: Map::new(),
                }),
            )
                .into_response(),
        }
    }
}

pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::InvalidRequest => StatusCode::BAD_REQUEST,
        FailureKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        FailureKind::Forbidden => StatusCode::FORBIDDEN,
        FailureKind::ServerBusy | FailureKind::ServerShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::TradeWindowNotOpen | FailureKind::TradeAlreadyInProgress => {
            StatusCode::CONFLICT
        }
        FailureKind::HostActionFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
