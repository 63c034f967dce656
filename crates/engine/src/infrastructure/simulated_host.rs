//! In-process stand-in for the game client.
//!
//! Keeps just enough state to answer host actions and emits the trade events a
//! real client would report: a requested partner opens the trade window, and
//! an accepted trade completes and closes it. The binary drives it from its
//! tick loop; tests use it as a deterministic host.

use std::collections::HashSet;

use guardian_domain::{ChatChannel, ChatMessage, GpAmount, PlayerName, WorldInfo, WorldNumber};

use crate::infrastructure::ports::{HostActions, HostError, HostEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChatChannel,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct SimulatedHost {
    worlds: Vec<WorldInfo>,
    current_world: Option<WorldNumber>,
    nearby: HashSet<String>,
    trade_partner: Option<String>,
    offered: Option<GpAmount>,
    events: Vec<HostEvent>,
    messages: Vec<SentMessage>,
    screenshots: Vec<String>,
}

impl SimulatedHost {
    pub fn new(worlds: Vec<WorldInfo>, current_world: Option<WorldNumber>) -> Self {
        Self {
            worlds,
            current_world,
            ..Self::default()
        }
    }

    /// A player that can receive trade requests.
    pub fn with_player(mut self, name: &str) -> Self {
        self.nearby.insert(normalize(name));
        self
    }

    /// Simulates another player opening a trade with us.
    pub fn open_inbound_trade(&mut self, partner: &str) {
        self.trade_partner = Some(partner.to_string());
        self.offered = None;
        self.events.push(HostEvent::TradeWindowOpened {
            partner: partner.to_string(),
        });
    }

    /// Simulates the partner walking away from the trade.
    pub fn close_trade(&mut self) {
        if self.trade_partner.take().is_some() {
            self.offered = None;
            self.events.push(HostEvent::TradeWindowClosed);
        }
    }

    /// Events produced since the last call, in order.
    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn messages(&self) -> &[SentMessage] {
        &self.messages
    }

    pub fn screenshots(&self) -> &[String] {
        &self.screenshots
    }

    pub fn trade_partner(&self) -> Option<&str> {
        self.trade_partner.as_deref()
    }

    pub fn offered(&self) -> Option<GpAmount> {
        self.offered
    }
}

impl HostActions for SimulatedHost {
    fn worlds(&self) -> Vec<WorldInfo> {
        self.worlds.clone()
    }

    fn current_world(&self) -> Option<WorldNumber> {
        self.current_world
    }

    fn hop_world(&mut self, world: WorldNumber) -> Result<(), HostError> {
        if self.current_world.is_none() {
            return Err(HostError::Failed("not logged in".to_string()));
        }
        tracing::debug!(world = %world, "Simulated world hop");
        self.current_world = Some(world);
        Ok(())
    }

    fn send_trade_request(&mut self, player: &PlayerName) -> Result<(), HostError> {
        if !self.nearby.contains(&normalize(player.as_str())) {
            return Err(HostError::NotFound(format!("Player {}", player)));
        }
        // The partner answers straight away; the window opens on the next event poll.
        self.trade_partner = Some(player.as_str().to_string());
        self.offered = None;
        self.events.push(HostEvent::TradeWindowOpened {
            partner: player.as_str().to_string(),
        });
        Ok(())
    }

    fn offer_gp(&mut self, amount: GpAmount) -> Result<(), HostError> {
        if self.trade_partner.is_none() {
            return Err(HostError::WindowClosed);
        }
        self.offered = Some(amount);
        Ok(())
    }

    fn accept_trade(&mut self) -> Result<(), HostError> {
        if self.trade_partner.is_none() {
            return Err(HostError::WindowClosed);
        }
        // Both sides accepted: the trade completes and the interface closes.
        self.close_trade();
        Ok(())
    }

    fn send_message(
        &mut self,
        message: &ChatMessage,
        channel: ChatChannel,
    ) -> Result<(), HostError> {
        self.messages.push(SentMessage {
            channel,
            text: message.as_str().to_string(),
        });
        Ok(())
    }

    fn capture_screenshot(&mut self, label: &str) -> Result<(), HostError> {
        self.screenshots.push(label.to_string());
        Ok(())
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '_' | '-' => ' ',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> SimulatedHost {
        let w302 = WorldNumber::new(302).unwrap();
        SimulatedHost::new(vec![WorldInfo::new(w302, 900)], Some(w302)).with_player("Iron_Bob")
    }

    #[test]
    fn trade_request_to_nearby_player_opens_window() {
        let mut host = host();
        host.send_trade_request(&PlayerName::new("iron bob").unwrap())
            .unwrap();
        assert_eq!(
            host.drain_events(),
            vec![HostEvent::TradeWindowOpened {
                partner: "iron bob".to_string()
            }]
        );
        assert!(host.drain_events().is_empty());
    }

    #[test]
    fn trade_request_to_unknown_player_is_not_found() {
        let mut host = host();
        let err = host
            .send_trade_request(&PlayerName::new("Nobody").unwrap())
            .unwrap_err();
        assert!(matches!(err, HostError::NotFound(_)));
        assert!(host.drain_events().is_empty());
    }

    #[test]
    fn offer_and_accept_need_open_window() {
        let mut host = host();
        assert_eq!(
            host.offer_gp(GpAmount::new(5).unwrap()),
            Err(HostError::WindowClosed)
        );
        assert_eq!(host.accept_trade(), Err(HostError::WindowClosed));
    }

    #[test]
    fn accepting_completes_and_closes_the_trade() {
        let mut host = host();
        host.open_inbound_trade("Alice");
        host.offer_gp(GpAmount::new(1000).unwrap()).unwrap();
        host.accept_trade().unwrap();
        assert_eq!(
            host.drain_events(),
            vec![
                HostEvent::TradeWindowOpened {
                    partner: "Alice".to_string()
                },
                HostEvent::TradeWindowClosed,
            ]
        );
        assert_eq!(host.trade_partner(), None);
    }
}
