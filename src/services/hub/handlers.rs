//! Message handlers for the PresenceHub
//!
//! Each handler performs its core operation first (registry or store
//! mutation), then the derived side effects (broadcasts, replies). Side
//! effect failures never roll back the core operation.

use super::PresenceHub;
use crate::domain::types::{ConnId, EmergencyAlert, Location, RouteSummary, UserId};
use crate::io::messages::OutboundMessage;
use chrono::Utc;
use tracing::{debug, info, warn};

impl PresenceHub {
    /// Register or replace a user's presence, then tell the others
    ///
    /// A duplicate announce is a full replacement, so a reconnecting client
    /// converges to a single session without an explicit logout.
    pub(crate) fn handle_announce(
        &mut self,
        conn: ConnId,
        user_id: UserId,
        location: Location,
        route: Option<RouteSummary>,
    ) {
        self.registry.upsert(user_id.clone(), location.clone(), route, conn);
        self.metrics.set_active_sessions(self.registry.len());

        let targeted = self.dispatcher.broadcast_location_update(&user_id, &location, conn);
        info!(
            user_id = %user_id,
            conn = %conn,
            active_sessions = %self.registry.len(),
            targeted = %targeted,
            "user_announced"
        );
    }

    /// Commit a location delta, then push it to every other session
    ///
    /// An update for a user with no active session is a logged no-op; the
    /// client is expected to re-announce.
    pub(crate) fn handle_location_update(
        &mut self,
        conn: ConnId,
        user_id: UserId,
        location: Location,
    ) {
        if let Err(e) = self.registry.update_location(&user_id, location.clone()) {
            self.metrics.record_unknown_user();
            warn!(user_id = %user_id, conn = %conn, error = %e, "location_update_ignored");
            return;
        }

        let targeted = self.dispatcher.broadcast_location_update(&user_id, &location, conn);
        debug!(user_id = %user_id, targeted = %targeted, "location_updated");
    }

    /// Answer a nearby-companion query; reply goes to the requester only
    pub(crate) fn handle_find_companions(
        &mut self,
        conn: ConnId,
        user_id: UserId,
        location: Location,
        max_distance_km: f64,
    ) {
        let companions = self.matcher.find_nearby(&location, max_distance_km, &user_id);
        info!(
            user_id = %user_id,
            max_distance_km = %max_distance_km,
            found = %companions.len(),
            "companions_query"
        );

        self.dispatcher.send_to(
            conn,
            OutboundMessage::CompanionsFound {
                requester_user_id: user_id,
                count: companions.len(),
                companions,
            },
        );
    }

    /// Build, persist, and fan out an emergency alert
    ///
    /// Accepted whether or not the sender has an active session. Enrichment
    /// and the durable append degrade independently; fan-out always runs.
    pub(crate) fn handle_sos(
        &mut self,
        user_id: UserId,
        location: Location,
        route: Option<RouteSummary>,
        message: String,
    ) {
        let (profile, active_route) = self.profile_store.snapshot(&user_id);
        let alert =
            EmergencyAlert::new(user_id, location, route, message, profile, active_route);

        let persisted = self.alert_store.append(&alert);
        let targeted = self.dispatcher.broadcast_emergency(&alert);
        self.metrics.record_emergency_alert();

        info!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            persisted = %persisted,
            targeted = %targeted,
            "emergency_alert"
        );
    }

    /// Tear down a closed connection and notify the others
    pub(crate) fn handle_disconnect(&mut self, conn: ConnId) {
        self.dispatcher.unregister(conn);

        if let Some(session) = self.registry.remove_by_connection(conn) {
            self.metrics.set_active_sessions(self.registry.len());
            let targeted = self.dispatcher.broadcast_companion_offline(&session.user_id);
            info!(
                user_id = %session.user_id,
                conn = %conn,
                targeted = %targeted,
                "user_disconnected"
            );
        } else {
            debug!(conn = %conn, "connection_closed_without_session");
        }
    }

    /// Remove sessions idle past the configured ttl and announce them offline
    pub(crate) fn sweep_inactive(&mut self) {
        let removed = self.registry.sweep(Utc::now(), self.config.session_ttl());
        if removed.is_empty() {
            return;
        }

        self.metrics.record_sessions_swept(removed.len() as u64);
        self.metrics.set_active_sessions(self.registry.len());
        for session in removed {
            self.dispatcher.unregister(session.conn);
            self.dispatcher.broadcast_companion_offline(&session.user_id);
            info!(
                user_id = %session.user_id,
                last_seen = %session.last_seen,
                "session_expired"
            );
        }
    }
}
