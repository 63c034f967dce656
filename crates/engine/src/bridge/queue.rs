//! Producer side of the execution bridge.
//!
//! Request handlers hold a [`CommandSubmitter`]; each submission travels as an
//! [`Envelope`] through a bounded channel to the host context and comes back
//! through the envelope's oneshot, which the caller waits on as a
//! [`PendingSlot`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use guardian_domain::{Command, CommandId, CommandResult, FailureKind, TradeStatus};
use tokio::sync::{mpsc, oneshot, watch};

/// Why a command could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Command queue is full")]
    Busy,
    #[error("Server is shutting down")]
    ShuttingDown,
}

impl SubmitError {
    pub fn failure_kind(self) -> FailureKind {
        match self {
            Self::Busy => FailureKind::ServerBusy,
            Self::ShuttingDown => FailureKind::ServerShuttingDown,
        }
    }
}

/// A queued command together with its reply slot.
pub(crate) struct Envelope {
    pub(crate) command: Command,
    pub(crate) reply: oneshot::Sender<CommandResult>,
    pub(crate) ticket: InFlightTicket,
}

/// Commands submitted but not yet executed, per caller.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    counts: Arc<DashMap<String, usize>>,
}

impl InFlight {
    pub fn count(&self, caller: Option<&str>) -> usize {
        self.counts
            .get(caller_key(caller))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub(crate) fn acquire(&self, caller: Option<&str>) -> InFlightTicket {
        let key = caller_key(caller).to_string();
        *self.counts.entry(key.clone()).or_insert(0) += 1;
        InFlightTicket {
            counts: Arc::clone(&self.counts),
            key,
        }
    }
}

/// Released once the command has run (or was failed at shutdown).
pub(crate) struct InFlightTicket {
    counts: Arc<DashMap<String, usize>>,
    key: String,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if let Some(mut count) = self.counts.get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
        self.counts.remove_if(&self.key, |_, count| *count == 0);
    }
}

// Anonymous callers share one bucket.
fn caller_key(caller: Option<&str>) -> &str {
    caller.unwrap_or_default()
}

/// Cloneable handle used by request handlers to reach the host context.
#[derive(Clone)]
pub struct CommandSubmitter {
    tx: mpsc::Sender<Envelope>,
    in_flight: InFlight,
    trade: watch::Receiver<TradeStatus>,
}

impl CommandSubmitter {
    pub(crate) fn new(
        tx: mpsc::Sender<Envelope>,
        in_flight: InFlight,
        trade: watch::Receiver<TradeStatus>,
    ) -> Self {
        Self {
            tx,
            in_flight,
            trade,
        }
    }

    /// Enqueue without waiting for room. A full queue is reported
    /// immediately as [`SubmitError::Busy`].
    pub fn submit(&self, command: Command) -> Result<PendingSlot, SubmitError> {
        let id = command.id();
        let (reply, rx) = oneshot::channel();
        let ticket = self.in_flight.acquire(command.requester());
        let envelope = Envelope {
            command,
            reply,
            ticket,
        };

        match self.tx.try_send(envelope) {
            Ok(()) => Ok(PendingSlot { id, rx }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    /// Number of commands waiting for the host.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn in_flight(&self, caller: Option<&str>) -> usize {
        self.in_flight.count(caller)
    }

    /// Last trade status published by the host context.
    pub fn trade_snapshot(&self) -> TradeStatus {
        self.trade.borrow().clone()
    }
}

/// The caller's half of a single-assignment result cell.
#[derive(Debug)]
pub struct PendingSlot {
    id: CommandId,
    rx: oneshot::Receiver<CommandResult>,
}

impl PendingSlot {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Wait for the result, up to `timeout`.
    ///
    /// On timeout the slot is dropped: the command may still run on the host,
    /// but its result is discarded.
    pub async fn wait(self, timeout: Duration) -> CommandResult {
        let id = self.id;
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => CommandResult::failure(
                id,
                FailureKind::ServerShuttingDown,
                "Server is shutting down",
            ),
            Err(_) => CommandResult::failure(
                id,
                FailureKind::Timeout,
                format!("No result within {} ms", timeout.as_millis()),
            ),
        }
    }
}
