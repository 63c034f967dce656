//! Trade negotiation state machine.
//!
//! There is exactly one [`TradeSession`] per host instance. It is driven by two
//! sources: successful trade commands and host-reported trade events. Every
//! transition goes through the methods below; an illegal transition returns a
//! [`DomainError`] and leaves the session untouched, except for contradictory
//! host observations which reset it.
//!
//! ```text
//! NoTrade ──request──▶ Requested ──opened──▶ WindowOpen ──offer──▶ OfferPending
//!    ▲                     │                   │    │                 │   │
//!    │                     └──────declined─────┼────┼───────▶ Declined ◀──┘
//!    │                                         └accept─▶ Accepted ◀accept─┘
//!    └──── window closed (any state) / grace period / request timeout ────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::command::{GpAmount, PlayerName};
use crate::error::DomainError;

/// State of the trade negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    #[default]
    NoTrade,
    Requested,
    WindowOpen,
    OfferPending,
    Accepted,
    Declined,
}

impl TradeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoTrade => "no_trade",
            Self::Requested => "requested",
            Self::WindowOpen => "window_open",
            Self::OfferPending => "offer_pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    /// Accepted and Declined only leave through a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Declined)
    }

    /// Whether offers and acceptance are possible in this state.
    pub fn is_window_open(self) -> bool {
        matches!(self, Self::WindowOpen | Self::OfferPending)
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the session returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeStatus {
    pub state: TradeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offered_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

/// The single in-progress trade negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeSession {
    state: TradeState,
    partner: Option<String>,
    offered: Option<GpAmount>,
    opened_at: Option<DateTime<Utc>>,
    state_since: Option<DateTime<Utc>>,
}

impl TradeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn partner(&self) -> Option<&str> {
        self.partner.as_deref()
    }

    pub fn offered_amount(&self) -> Option<GpAmount> {
        self.offered
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn status(&self) -> TradeStatus {
        TradeStatus {
            state: self.state,
            partner: self.partner.clone(),
            offered_amount: self.offered.map(GpAmount::get),
            opened_at: self.opened_at,
        }
    }

    // ------------------------------------------------------------------
    // Preconditions (checked before touching the host)
    // ------------------------------------------------------------------

    pub fn ensure_can_request(&self) -> Result<(), DomainError> {
        match self.state {
            TradeState::NoTrade => Ok(()),
            state => Err(DomainError::TradeAlreadyInProgress(state)),
        }
    }

    pub fn ensure_window_open(&self) -> Result<(), DomainError> {
        if self.state.is_window_open() {
            Ok(())
        } else {
            Err(DomainError::TradeWindowNotOpen(self.state))
        }
    }

    // ------------------------------------------------------------------
    // Command-driven transitions
    // ------------------------------------------------------------------

    /// A trade request was sent to `partner`.
    pub fn request_sent(&mut self, partner: &PlayerName, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_can_request()?;
        self.state = TradeState::Requested;
        self.partner = Some(partner.as_str().to_string());
        self.offered = None;
        self.opened_at = Some(now);
        self.state_since = Some(now);
        Ok(())
    }

    /// Our offer is now `amount`.
    pub fn offer_set(&mut self, amount: GpAmount, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_window_open()?;
        self.offered = Some(amount);
        self.enter(TradeState::OfferPending, now);
        Ok(())
    }

    /// We accepted the trade.
    pub fn accepted(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_window_open()?;
        self.enter(TradeState::Accepted, now);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host-driven transitions
    // ------------------------------------------------------------------

    /// The host reports the trade interface opened with `partner`.
    ///
    /// From `NoTrade` this is an inbound trade. From `Requested` the partner
    /// must be the one we asked. Any other observation contradicts the
    /// session, which is reset and reported as a protocol violation.
    pub fn window_opened(&mut self, partner: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.state {
            TradeState::NoTrade => {
                self.partner = Some(partner.trim().to_string());
                self.offered = None;
                self.opened_at = Some(now);
                self.enter(TradeState::WindowOpen, now);
                Ok(())
            }
            TradeState::Requested => {
                let expected = self.partner.as_deref().unwrap_or_default();
                let same_partner = PlayerName::new(expected)
                    .map(|name| name.matches(partner))
                    .unwrap_or(false);
                if !same_partner {
                    let msg = format!(
                        "window opened with '{}' while waiting for '{}'",
                        partner.trim(),
                        expected
                    );
                    self.reset();
                    return Err(DomainError::protocol_violation(msg));
                }
                self.enter(TradeState::WindowOpen, now);
                Ok(())
            }
            state => {
                self.reset();
                Err(DomainError::protocol_violation(format!(
                    "window opened while {}",
                    state
                )))
            }
        }
    }

    /// The host reports our offer in the window changed to `amount`.
    pub fn offer_changed(&mut self, amount: GpAmount, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.offer_set(amount, now)
    }

    /// The partner declined the request or the trade.
    pub fn declined(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.state {
            TradeState::Requested | TradeState::WindowOpen | TradeState::OfferPending => {
                self.enter(TradeState::Declined, now);
                Ok(())
            }
            state => Err(DomainError::TradeWindowNotOpen(state)),
        }
    }

    /// External closure always wins. Returns the state that was left.
    pub fn window_closed(&mut self) -> TradeState {
        let previous = self.state;
        self.reset();
        previous
    }

    /// Resets stale sessions: a request whose window never opened within
    /// `request_timeout`, or a terminal state older than `grace`.
    ///
    /// Returns the state that was left, if any.
    pub fn expire(
        &mut self,
        now: DateTime<Utc>,
        request_timeout: Duration,
        grace: Duration,
    ) -> Option<TradeState> {
        let since = self.state_since?;
        let elapsed = now.signed_duration_since(since);
        let expired = match self.state {
            TradeState::Requested => elapsed >= request_timeout,
            state if state.is_terminal() => elapsed >= grace,
            _ => false,
        };
        if expired {
            let previous = self.state;
            self.reset();
            Some(previous)
        } else {
            None
        }
    }

    fn enter(&mut self, state: TradeState, now: DateTime<Utc>) {
        self.state = state;
        self.state_since = Some(now);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 10, 30, 0).unwrap()
    }

    fn bob() -> PlayerName {
        PlayerName::new("Bob").unwrap()
    }

    fn gp(amount: u64) -> GpAmount {
        GpAmount::new(amount).unwrap()
    }

    #[test]
    fn full_negotiation_reaches_accepted_then_resets_on_close() {
        let mut session = TradeSession::new();
        assert_eq!(session.state(), TradeState::NoTrade);

        session.request_sent(&bob(), t0()).unwrap();
        assert_eq!(session.state(), TradeState::Requested);

        session.window_opened("bob", t0()).unwrap();
        assert_eq!(session.state(), TradeState::WindowOpen);

        session.offer_set(gp(1000), t0()).unwrap();
        assert_eq!(session.state(), TradeState::OfferPending);
        assert_eq!(session.offered_amount(), Some(gp(1000)));

        session.accepted(t0()).unwrap();
        assert_eq!(session.state(), TradeState::Accepted);

        assert_eq!(session.window_closed(), TradeState::Accepted);
        assert_eq!(session, TradeSession::new());
    }

    #[test]
    fn request_only_from_no_trade() {
        for state in [
            TradeState::Requested,
            TradeState::WindowOpen,
            TradeState::OfferPending,
            TradeState::Accepted,
        ] {
            let mut session = session_in(state);
            let err = session.request_sent(&bob(), t0()).unwrap_err();
            assert_eq!(err, DomainError::TradeAlreadyInProgress(state));
            assert_eq!(session.state(), state);
        }
    }

    #[test]
    fn offer_and_accept_need_open_window() {
        for state in [TradeState::NoTrade, TradeState::Requested] {
            let mut session = session_in(state);
            assert_eq!(
                session.offer_set(gp(1), t0()).unwrap_err(),
                DomainError::TradeWindowNotOpen(state)
            );
            assert_eq!(
                session.accepted(t0()).unwrap_err(),
                DomainError::TradeWindowNotOpen(state)
            );
            assert_eq!(session.state(), state);
        }
    }

    #[test]
    fn accept_without_offer_is_allowed() {
        let mut session = session_in(TradeState::WindowOpen);
        session.accepted(t0()).unwrap();
        assert_eq!(session.state(), TradeState::Accepted);
        assert_eq!(session.offered_amount(), None);
    }

    #[test]
    fn offer_can_be_revised() {
        let mut session = session_in(TradeState::WindowOpen);
        session.offer_set(gp(500), t0()).unwrap();
        session.offer_changed(gp(750), t0()).unwrap();
        assert_eq!(session.state(), TradeState::OfferPending);
        assert_eq!(session.offered_amount(), Some(gp(750)));
    }

    #[test]
    fn inbound_trade_opens_window_from_no_trade() {
        let mut session = TradeSession::new();
        session.window_opened("Alice", t0()).unwrap();
        assert_eq!(session.state(), TradeState::WindowOpen);
        assert_eq!(session.partner(), Some("Alice"));
    }

    #[test]
    fn window_opened_with_other_partner_resets() {
        let mut session = TradeSession::new();
        session.request_sent(&bob(), t0()).unwrap();
        let err = session.window_opened("Mallory", t0()).unwrap_err();
        assert!(matches!(err, DomainError::ProtocolViolation(_)));
        assert_eq!(session.state(), TradeState::NoTrade);
    }

    #[test]
    fn second_window_open_is_a_violation() {
        let mut session = session_in(TradeState::OfferPending);
        assert!(matches!(
            session.window_opened("Bob", t0()),
            Err(DomainError::ProtocolViolation(_))
        ));
        assert_eq!(session.state(), TradeState::NoTrade);
    }

    #[test]
    fn window_closed_wins_from_every_state() {
        for state in [
            TradeState::NoTrade,
            TradeState::Requested,
            TradeState::WindowOpen,
            TradeState::OfferPending,
            TradeState::Accepted,
            TradeState::Declined,
        ] {
            let mut session = session_in(state);
            assert_eq!(session.window_closed(), state);
            assert_eq!(session.state(), TradeState::NoTrade);
        }
    }

    #[test]
    fn declined_is_terminal() {
        let mut session = session_in(TradeState::OfferPending);
        session.declined(t0()).unwrap();
        assert_eq!(session.state(), TradeState::Declined);
        assert!(session.accepted(t0()).is_err());
        assert!(session.declined(t0()).is_err());
    }

    #[test]
    fn terminal_states_expire_after_grace() {
        let mut session = session_in(TradeState::Accepted);
        let grace = Duration::seconds(5);
        let timeout = Duration::seconds(30);

        assert_eq!(session.expire(t0() + Duration::seconds(4), timeout, grace), None);
        assert_eq!(
            session.expire(t0() + Duration::seconds(5), timeout, grace),
            Some(TradeState::Accepted)
        );
        assert_eq!(session.state(), TradeState::NoTrade);
    }

    #[test]
    fn unanswered_request_expires() {
        let mut session = TradeSession::new();
        session.request_sent(&bob(), t0()).unwrap();
        let timeout = Duration::seconds(30);
        let grace = Duration::seconds(5);

        assert_eq!(session.expire(t0() + Duration::seconds(29), timeout, grace), None);
        assert_eq!(
            session.expire(t0() + Duration::seconds(30), timeout, grace),
            Some(TradeState::Requested)
        );
    }

    #[test]
    fn open_window_never_expires() {
        let mut session = session_in(TradeState::OfferPending);
        let later = t0() + Duration::hours(1);
        assert_eq!(
            session.expire(later, Duration::seconds(30), Duration::seconds(5)),
            None
        );
    }

    #[test]
    fn status_serializes_state_tag() {
        let mut session = session_in(TradeState::WindowOpen);
        session.offer_set(gp(1000), t0()).unwrap();
        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["state"], "offer_pending");
        assert_eq!(json["partner"], "Bob");
        assert_eq!(json["offered_amount"], 1000);

        let idle = serde_json::to_value(TradeSession::new().status()).unwrap();
        assert_eq!(idle, serde_json::json!({ "state": "no_trade" }));
    }

    fn session_in(state: TradeState) -> TradeSession {
        let mut session = TradeSession::new();
        match state {
            TradeState::NoTrade => {}
            TradeState::Requested => session.request_sent(&bob(), t0()).unwrap(),
            TradeState::WindowOpen => {
                session.request_sent(&bob(), t0()).unwrap();
                session.window_opened("Bob", t0()).unwrap();
            }
            TradeState::OfferPending => {
                session = session_in(TradeState::WindowOpen);
                session.offer_set(gp(100), t0()).unwrap();
            }
            TradeState::Accepted => {
                session = session_in(TradeState::OfferPending);
                session.accepted(t0()).unwrap();
            }
            TradeState::Declined => {
                session = session_in(TradeState::WindowOpen);
                session.declined(t0()).unwrap();
            }
        }
        assert_eq!(session.state(), state);
        session
    }
}
