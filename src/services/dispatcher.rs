//! Broadcast dispatcher - fan-out to connected sessions
//!
//! Each transport connection registers a bounded outbound channel. Fan-out
//! snapshots the sender map and then delivers per connection, so a slow or
//! broken connection never blocks the registry or the other recipients.
//!
//! Routine traffic (location deltas, offline notices) uses `try_send` and
//! drops on a full channel, counting the drop. Emergency alerts use an
//! awaiting send inside a dedicated task per connection, so delivery is
//! attempted even to a momentarily saturated channel.

use crate::domain::types::{ConnId, EmergencyAlert, Location, UserId};
use crate::infra::metrics::Metrics;
use crate::io::messages::OutboundMessage;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fan-out of presence and emergency events to all connected sessions
pub struct BroadcastDispatcher {
    conns: Mutex<FxHashMap<ConnId, mpsc::Sender<OutboundMessage>>>,
    metrics: Arc<Metrics>,
}

impl BroadcastDispatcher {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { conns: Mutex::new(FxHashMap::default()), metrics }
    }

    /// Register a connection's outbound channel
    pub fn register(&self, conn: ConnId, sender: mpsc::Sender<OutboundMessage>) {
        self.conns.lock().insert(conn, sender);
        debug!(conn = %conn, "connection_registered");
    }

    /// Drop a connection's outbound channel
    pub fn unregister(&self, conn: ConnId) {
        self.conns.lock().remove(&conn);
        debug!(conn = %conn, "connection_unregistered");
    }

    pub fn connection_count(&self) -> usize {
        self.conns.lock().len()
    }

    /// Reply to a single connection (companion query results)
    pub fn send_to(&self, conn: ConnId, message: OutboundMessage) {
        let sender = self.conns.lock().get(&conn).cloned();
        match sender {
            Some(sender) => {
                if sender.try_send(message).is_err() {
                    self.metrics.record_broadcast_drop();
                    warn!(conn = %conn, "reply_dropped: channel full or closed");
                }
            }
            None => debug!(conn = %conn, "reply_skipped: connection gone"),
        }
    }

    /// Push a location delta to every other connected session
    /// Returns the number of sessions targeted
    pub fn broadcast_location_update(
        &self,
        user_id: &UserId,
        location: &Location,
        exclude: ConnId,
    ) -> usize {
        self.broadcast(
            OutboundMessage::CompanionLocationUpdate {
                user_id: user_id.clone(),
                location: location.clone(),
            },
            Some(exclude),
        )
    }

    /// Push an offline notice to all connected sessions
    pub fn broadcast_companion_offline(&self, user_id: &UserId) -> usize {
        self.broadcast(OutboundMessage::CompanionOffline { user_id: user_id.clone() }, None)
    }

    /// Push the full alert payload to every connected session
    ///
    /// Intentionally unscoped: no distance filter, sender included.
    /// Delivery is attempted per connection in an independent task.
    pub fn broadcast_emergency(&self, alert: &EmergencyAlert) -> usize {
        let targets: Vec<(ConnId, mpsc::Sender<OutboundMessage>)> =
            self.conns.lock().iter().map(|(c, s)| (*c, s.clone())).collect();

        let targeted = targets.len();
        for (conn, sender) in targets {
            let message = OutboundMessage::EmergencyAlert { alert: alert.clone() };
            let alert_id = alert.id;
            tokio::spawn(async move {
                if sender.send(message).await.is_err() {
                    warn!(conn = %conn, alert_id = %alert_id, "emergency_delivery_failed: connection closed");
                }
            });
        }

        self.metrics.record_broadcasts(targeted as u64);
        debug!(alert_id = %alert.id, targeted = %targeted, "emergency_broadcast");
        targeted
    }

    fn broadcast(&self, message: OutboundMessage, exclude: Option<ConnId>) -> usize {
        // Snapshot the senders, then deliver outside the lock
        let targets: Vec<(ConnId, mpsc::Sender<OutboundMessage>)> = self
            .conns
            .lock()
            .iter()
            .filter(|(conn, _)| Some(**conn) != exclude)
            .map(|(c, s)| (*c, s.clone()))
            .collect();

        let targeted = targets.len();
        for (conn, sender) in targets {
            if sender.try_send(message.clone()).is_err() {
                self.metrics.record_broadcast_drop();
                debug!(conn = %conn, "broadcast_dropped: channel full or closed");
            }
        }

        self.metrics.record_broadcasts(targeted as u64);
        targeted
    }
}
