//! Proximity matching against the presence registry
//!
//! Linear scan over a registry snapshot; fine at the target scale of
//! roughly a thousand concurrent sessions.

use crate::domain::geo::haversine_km;
use crate::domain::types::{CompanionMatch, Location, Session, UserId};
use crate::services::presence::PresenceRegistry;
use std::sync::Arc;

/// Computes nearby-companion queries over registry snapshots
pub struct ProximityMatcher {
    registry: Arc<PresenceRegistry>,
}

impl ProximityMatcher {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Active sessions within `max_distance_km` of the requester, sorted
    /// ascending by distance (ties by user id for determinism)
    ///
    /// The requester's own session is excluded. Returns an empty vec when
    /// nothing qualifies; there is no failure mode.
    pub fn find_nearby(
        &self,
        requester_location: &Location,
        max_distance_km: f64,
        exclude_user_id: &UserId,
    ) -> Vec<CompanionMatch> {
        let snapshot = self.registry.list_active();
        nearby_in_snapshot(&snapshot, requester_location, max_distance_km, exclude_user_id)
    }
}

/// Pure matching over an already-taken snapshot
pub fn nearby_in_snapshot(
    snapshot: &[Session],
    requester_location: &Location,
    max_distance_km: f64,
    exclude_user_id: &UserId,
) -> Vec<CompanionMatch> {
    let mut matches: Vec<CompanionMatch> = snapshot
        .iter()
        .filter(|s| &s.user_id != exclude_user_id)
        .filter_map(|s| {
            let distance_km = haversine_km(requester_location, &s.location);
            (distance_km <= max_distance_km).then(|| CompanionMatch {
                user_id: s.user_id.clone(),
                distance_km,
                location: s.location.clone(),
                route: s.route.clone(),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    matches
}
