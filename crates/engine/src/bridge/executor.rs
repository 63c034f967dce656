//! Consumer side of the execution bridge, owned by the host context.
//!
//! The host calls [`HostExecutor::on_tick`] once per game tick and forwards
//! its trade events to [`HostExecutor::on_event`]. Both run on the host
//! thread, so the [`TradeSession`] and every [`HostActions`] call stay on the
//! host's own execution context.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use guardian_domain::{
    Command, CommandPayload, CommandRequest, CommandResult, Failure, FailureKind, Outcome,
    TradeSession, TradeState, TradeStatus,
};
use tokio::sync::{mpsc, watch};

use super::queue::{CommandSubmitter, Envelope, InFlight};
use crate::infrastructure::ports::{ClockPort, HostActions, HostError, HostEvent};

/// Knobs for the execution bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Maximum number of queued commands.
    pub queue_capacity: usize,
    /// Commands drained per tick. Zero pauses draining.
    pub commands_per_tick: usize,
    /// How long a sent trade request may wait for the window to open.
    pub trade_request_timeout: Duration,
    /// How long Accepted/Declined are kept before resetting to NoTrade.
    pub trade_grace_period: Duration,
    pub auto_accept_trades: bool,
    pub screenshot_trades: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            commands_per_tick: 2,
            trade_request_timeout: Duration::from_secs(30),
            trade_grace_period: Duration::from_secs(5),
            auto_accept_trades: false,
            screenshot_trades: true,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Commands taken off the queue and run.
    pub executed: usize,
    /// Of those, how many produced a failure result.
    pub failed: usize,
    /// Results nobody was waiting for anymore.
    pub detached: usize,
    /// State left by a trade expiry, if one happened.
    pub expired: Option<TradeState>,
    pub auto_accepted: bool,
}

pub struct HostExecutor {
    rx: Option<mpsc::Receiver<Envelope>>,
    in_flight: InFlight,
    session: TradeSession,
    snapshot: watch::Sender<TradeStatus>,
    settings: BridgeSettings,
    clock: Arc<dyn ClockPort>,
    accept_pending: bool,
}

impl HostExecutor {
    pub fn new(settings: BridgeSettings, clock: Arc<dyn ClockPort>) -> Self {
        let (snapshot, _) = watch::channel(TradeStatus::default());
        Self {
            rx: None,
            in_flight: InFlight::default(),
            session: TradeSession::new(),
            snapshot,
            settings,
            clock,
            accept_pending: false,
        }
    }

    /// Opens a fresh command queue and returns its producer handle.
    ///
    /// Any previous queue is shut down first. The trade session carries over.
    pub fn connect(&mut self) -> CommandSubmitter {
        self.shutdown();
        let (tx, rx) = mpsc::channel(self.settings.queue_capacity.max(1));
        self.rx = Some(rx);
        CommandSubmitter::new(tx, self.in_flight.clone(), self.snapshot.subscribe())
    }

    pub fn is_connected(&self) -> bool {
        self.rx.is_some()
    }

    pub fn trade_status(&self) -> TradeStatus {
        self.session.status()
    }

    pub fn trade_state(&self) -> TradeState {
        self.session.state()
    }

    /// Runs housekeeping, then drains up to `commands_per_tick` commands.
    pub fn on_tick(&mut self, host: &mut dyn HostActions) -> TickReport {
        let mut report = TickReport::default();
        let now = self.clock.now();

        if let Some(previous) = self.session.expire(
            now,
            to_chrono(self.settings.trade_request_timeout),
            to_chrono(self.settings.trade_grace_period),
        ) {
            tracing::info!(previous = %previous, "Trade session reset after expiry");
            self.accept_pending = false;
            report.expired = Some(previous);
            self.publish();
        }

        if self.accept_pending {
            self.accept_pending = false;
            report.auto_accepted = self.auto_accept(host);
            self.publish();
        }

        for _ in 0..self.settings.commands_per_tick {
            let Some(rx) = self.rx.as_mut() else {
                break;
            };
            let Ok(envelope) = rx.try_recv() else {
                break;
            };
            let Envelope {
                command,
                reply,
                ticket,
            } = envelope;

            let result = self.execute(host, &command);
            report.executed += 1;
            if !result.is_success() {
                report.failed += 1;
            }

            // Snapshot first, then release the caller: a status read issued
            // after this reply must see the new state.
            self.publish();
            drop(ticket);
            if reply.send(result).is_err() {
                report.detached += 1;
                tracing::debug!(
                    command_id = %command.id().short(),
                    kind = %command.kind(),
                    "Caller detached before the result was ready"
                );
            }
        }

        report
    }

    /// Feeds a host-reported trade event into the session.
    pub fn on_event(&mut self, event: HostEvent) {
        let now = self.clock.now();
        match event {
            HostEvent::TradeWindowOpened { partner } => {
                match self.session.window_opened(&partner, now) {
                    Ok(()) => tracing::info!(partner = %partner, "Trade window opened"),
                    Err(e) => {
                        self.accept_pending = false;
                        tracing::warn!(error = %e, "Trade session reset");
                    }
                }
            }
            HostEvent::TradeWindowClosed => {
                let previous = self.session.window_closed();
                self.accept_pending = false;
                tracing::info!(previous = %previous, "Trade window closed");
            }
            HostEvent::TradeOfferChanged { amount } => {
                if let Err(e) = self.session.offer_changed(amount, now) {
                    tracing::warn!(error = %e, amount = %amount, "Ignored offer change");
                }
            }
            HostEvent::PartnerAccepted => {
                tracing::info!(state = %self.session.state(), "Trade partner accepted");
                if self.settings.auto_accept_trades
                    && self.session.state() == TradeState::OfferPending
                {
                    self.accept_pending = true;
                }
            }
            HostEvent::PartnerDeclined => {
                self.accept_pending = false;
                match self.session.declined(now) {
                    Ok(()) => tracing::info!("Trade declined by partner"),
                    Err(e) => tracing::warn!(error = %e, "Ignored trade decline"),
                }
            }
        }
        self.publish();
    }

    /// Closes the queue and fails everything still in it with
    /// `ServerShuttingDown`. Returns how many commands were failed.
    pub fn shutdown(&mut self) -> usize {
        let Some(mut rx) = self.rx.take() else {
            return 0;
        };
        rx.close();

        let mut failed = 0;
        while let Ok(Envelope {
            command,
            reply,
            ticket,
        }) = rx.try_recv()
        {
            drop(ticket);
            let _ = reply.send(CommandResult::failure(
                command.id(),
                FailureKind::ServerShuttingDown,
                "Server is shutting down",
            ));
            failed += 1;
        }

        tracing::info!(failed, "Command queue closed");
        failed
    }

    fn execute(&mut self, host: &mut dyn HostActions, command: &Command) -> CommandResult {
        let id = command.id();
        let queued_ms = (self.clock.now() - command.submitted_at()).num_milliseconds();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(host, command)));

        match outcome {
            Ok(Ok(payload)) => {
                tracing::info!(
                    command_id = %id.short(),
                    kind = %command.kind(),
                    queued_ms,
                    "Command executed"
                );
                CommandResult::success(id, payload)
            }
            Ok(Err(failure)) => {
                tracing::info!(
                    command_id = %id.short(),
                    kind = %command.kind(),
                    queued_ms,
                    failure = %failure.kind,
                    message = %failure.message,
                    "Command failed"
                );
                CommandResult {
                    id,
                    outcome: Outcome::Failure(failure),
                }
            }
            Err(panic) => {
                tracing::error!(
                    command_id = %id.short(),
                    kind = %command.kind(),
                    panic = %panic_message(&*panic),
                    "Host action panicked"
                );
                CommandResult::failure(id, FailureKind::HostActionFailed, "Host action failed")
            }
        }
    }

    fn dispatch(
        &mut self,
        host: &mut dyn HostActions,
        command: &Command,
    ) -> Result<CommandPayload, Failure> {
        let now = self.clock.now();
        match command.request() {
            CommandRequest::HopWorld { world } => {
                if !host.worlds().iter().any(|info| info.number == *world) {
                    return Err(Failure::new(
                        FailureKind::NotFound,
                        format!("World {} not found", world),
                    ));
                }
                host.hop_world(*world).map_err(host_failure)?;
                Ok(CommandPayload::Done(true))
            }
            CommandRequest::SendTradeRequest { rsn } => {
                self.session.ensure_can_request()?;
                host.send_trade_request(rsn).map_err(host_failure)?;
                self.session.request_sent(rsn, now)?;
                Ok(CommandPayload::Done(true))
            }
            CommandRequest::OfferGp { amount } => {
                self.session.ensure_window_open()?;
                host.offer_gp(*amount).map_err(host_failure)?;
                self.session.offer_set(*amount, now)?;
                Ok(CommandPayload::Done(true))
            }
            CommandRequest::AcceptTrade => {
                self.session.ensure_window_open()?;
                host.accept_trade().map_err(host_failure)?;
                self.session.accepted(now)?;
                self.after_accept(host);
                Ok(CommandPayload::Done(true))
            }
            CommandRequest::GetTradeStatus => Ok(CommandPayload::TradeStatus(self.session.status())),
            CommandRequest::SendMessage { message, channel } => {
                host.send_message(message, *channel).map_err(host_failure)?;
                Ok(CommandPayload::Done(true))
            }
            CommandRequest::GetCurrentWorld => match host.current_world() {
                Some(world) => Ok(CommandPayload::CurrentWorld { world: world.get() }),
                None => Err(Failure::new(FailureKind::NotFound, "Not logged in to a world")),
            },
        }
    }

    fn auto_accept(&mut self, host: &mut dyn HostActions) -> bool {
        if self.session.state() != TradeState::OfferPending {
            return false;
        }
        let now = self.clock.now();
        let accepted = panic::catch_unwind(AssertUnwindSafe(|| host.accept_trade()));
        match accepted {
            Ok(Ok(())) => {
                if self.session.accepted(now).is_err() {
                    return false;
                }
                tracing::info!(partner = ?self.session.partner(), "Trade auto-accepted");
                self.after_accept(host);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Auto-accept failed");
                false
            }
            Err(panic) => {
                tracing::error!(panic = %panic_message(&*panic), "Auto-accept panicked");
                false
            }
        }
    }

    fn after_accept(&mut self, host: &mut dyn HostActions) {
        if !self.settings.screenshot_trades {
            return;
        }
        let label = format!("trade-{}", self.session.partner().unwrap_or("unknown"));
        match panic::catch_unwind(AssertUnwindSafe(|| host.capture_screenshot(&label))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Trade screenshot failed"),
            Err(panic) => {
                tracing::error!(panic = %panic_message(&*panic), "Trade screenshot panicked")
            }
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.status());
    }
}

/// Maps a host failure to a client-facing failure, keeping host details in the log.
fn host_failure(err: HostError) -> Failure {
    match err {
        HostError::NotFound(what) => Failure::new(FailureKind::NotFound, format!("{} not found", what)),
        HostError::WindowClosed => {
            Failure::new(FailureKind::TradeWindowNotOpen, "Trade window is not open")
        }
        HostError::Failed(detail) => {
            tracing::warn!(error = %detail, "Host action failed");
            Failure::new(FailureKind::HostActionFailed, "Host action failed")
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
