//! Command use case: authorize, enqueue, await.

use std::sync::Arc;
use std::time::Duration;

use guardian_domain::{
    Command, CommandKind, CommandPayload, CommandRequest, CommandResult, FailureKind, TradeStatus,
};
use serde::Serialize;

use super::authorization::AuthorizationGuard;
use crate::bridge::CommandSubmitter;
use crate::infrastructure::ports::ClockPort;

/// Bridge health reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub accepting: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub trade: TradeStatus,
}

/// Runs one command on behalf of a caller.
///
/// Authorization happens before anything is enqueued, so rejected commands
/// never reach the host context.
pub struct CommandService {
    guard: Arc<AuthorizationGuard>,
    submitter: CommandSubmitter,
    clock: Arc<dyn ClockPort>,
    request_timeout: Duration,
}

impl CommandService {
    pub fn new(
        guard: Arc<AuthorizationGuard>,
        submitter: CommandSubmitter,
        clock: Arc<dyn ClockPort>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            submitter,
            clock,
            request_timeout,
        }
    }

    pub async fn execute(&self, request: CommandRequest, requester: Option<String>) -> CommandResult {
        let kind = request.kind();
        let command = Command::new(request, requester, self.clock.now());
        let id = command.id();

        if let Err(e) = self.guard.authorize(command.requester(), kind) {
            tracing::warn!(
                command_id = %id.short(),
                kind = %kind,
                requester = ?command.requester(),
                error = %e,
                "Command rejected"
            );
            return CommandResult::failure(id, e.failure_kind(), e.to_string());
        }

        // Status reads skip the queue unless this caller still has commands
        // waiting, which would make the snapshot stale for them.
        if kind == CommandKind::GetTradeStatus && self.submitter.in_flight(command.requester()) == 0
        {
            return CommandResult::success(
                id,
                CommandPayload::TradeStatus(self.submitter.trade_snapshot()),
            );
        }

        let slot = match self.submitter.submit(command) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(command_id = %id.short(), kind = %kind, error = %e, "Command not enqueued");
                return CommandResult::failure(id, e.failure_kind(), e.to_string());
            }
        };
        tracing::debug!(command_id = %id.short(), kind = %kind, depth = self.submitter.depth(), "Command enqueued");

        let result = slot.wait(self.request_timeout).await;
        if result.failure_kind() == Some(FailureKind::Timeout) {
            tracing::warn!(
                command_id = %id.short(),
                kind = %kind,
                "Caller detached after timeout; the command may still run"
            );
        }
        result
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            accepting: !self.submitter.is_closed(),
            queue_depth: self.submitter.depth(),
            queue_capacity: self.submitter.capacity(),
            trade: self.submitter.trade_snapshot(),
        }
    }
}
