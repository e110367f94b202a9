//! Presence hub - central event processor for live sessions
//!
//! The hub is the single consumer of the inbound event channel and
//! coordinates:
//! - Session lifecycle in the presence registry (announce, update, remove)
//! - Companion queries via the proximity matcher
//! - Emergency alerts (enrichment, durable append, fan-out)
//! - Periodic inactivity sweeps

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::ConnId;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::alert_store::AlertStore;
use crate::io::messages::{InboundMessage, OutboundMessage};
use crate::io::profile_store::ProfileStore;
use crate::services::dispatcher::BroadcastDispatcher;
use crate::services::matcher::ProximityMatcher;
use crate::services::presence::PresenceRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

/// Events delivered to the hub from the transport layer
#[derive(Debug)]
pub enum HubEvent {
    /// A connection opened; `outbound` carries its bounded reply channel
    Connected { conn: ConnId, outbound: mpsc::Sender<OutboundMessage> },
    /// A validated inbound message from a connection
    Message { conn: ConnId, message: InboundMessage },
    /// A connection closed (EOF, error, or client exit)
    Disconnected { conn: ConnId },
}

/// Central event processor for presence and emergency handling
pub struct PresenceHub {
    pub(crate) registry: Arc<PresenceRegistry>,
    pub(crate) matcher: ProximityMatcher,
    pub(crate) dispatcher: Arc<BroadcastDispatcher>,
    pub(crate) alert_store: AlertStore,
    pub(crate) profile_store: ProfileStore,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
}

impl PresenceHub {
    pub fn new(
        config: Config,
        registry: Arc<PresenceRegistry>,
        dispatcher: Arc<BroadcastDispatcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let alert_store = AlertStore::new(config.alert_file());
        let profile_store = ProfileStore::load(config.profile_file());
        let matcher = ProximityMatcher::new(registry.clone());
        Self { registry, matcher, dispatcher, alert_store, profile_store, config, metrics }
    }

    /// Start the hub, consuming events from the channel
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<HubEvent>) {
        // interval() rejects a zero period; clamp a misconfigured value
        let mut sweep_interval =
            interval(Duration::from_secs(self.config.sweep_interval_secs().max(1)));
        // The first tick fires immediately; harmless against an empty registry
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e).await,
                        None => break, // Channel closed
                    }
                }
                _ = sweep_interval.tick() => {
                    self.sweep_inactive();
                }
            }
        }
    }

    /// Process a single event, dispatching to the appropriate handler
    pub async fn process_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { conn, outbound } => {
                self.dispatcher.register(conn, outbound);
            }
            HubEvent::Message { conn, message } => {
                self.process_message(conn, message);
                self.metrics.record_event_processed();
            }
            HubEvent::Disconnected { conn } => {
                self.handle_disconnect(conn);
            }
        }
    }

    fn process_message(&mut self, conn: ConnId, message: InboundMessage) {
        debug!(conn = %conn, message_type = %message.message_type(), "hub_message");
        match message {
            InboundMessage::Announce { user_id, location, route } => {
                self.handle_announce(conn, user_id, location, route);
            }
            InboundMessage::LocationUpdate { user_id, location } => {
                self.handle_location_update(conn, user_id, location);
            }
            InboundMessage::FindCompanions { user_id, location, max_distance_km } => {
                self.handle_find_companions(conn, user_id, location, max_distance_km);
            }
            InboundMessage::Sos { user_id, location, route, message } => {
                self.handle_sos(user_id, location, route, message);
            }
        }
    }

    /// Get current active session count
    #[allow(dead_code)]
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }
}
