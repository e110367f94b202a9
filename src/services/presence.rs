//! Presence registry - concurrency-safe store of connected users
//!
//! The registry owns every `Session` exclusively: sessions are created by
//! `upsert`, mutated only through registry operations, and removed on
//! disconnect or by the inactivity sweep. At most one live session exists
//! per user id - a duplicate announce replaces the prior session
//! (last-writer-wins), it never appends.
//!
//! All mutating operations take the single internal lock; read paths for
//! matching and broadcast use `list_active` to take a point-in-time
//! snapshot instead of holding the lock across iteration.

use crate::domain::types::{ConnId, Location, RouteSummary, Session, UserId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// A presence operation referenced a user with no active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUser(pub UserId);

impl std::fmt::Display for UnknownUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no active session for user {}", self.0)
    }
}

impl std::error::Error for UnknownUser {}

#[derive(Default)]
struct RegistryInner {
    sessions: FxHashMap<UserId, Session>,
    /// Transport handle -> user id, for disconnects without explicit logout
    user_by_conn: FxHashMap<ConnId, UserId>,
}

/// Concurrency-safe store of currently connected users
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the session for a user
    ///
    /// Idempotent under repeated identical calls. When the user re-announces
    /// from a new connection, the stale handle index entry is dropped.
    pub fn upsert(
        &self,
        user_id: UserId,
        location: Location,
        route: Option<RouteSummary>,
        conn: ConnId,
    ) {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        if let Some(prev) = inner.sessions.get(&user_id) {
            if prev.conn != conn {
                let prev_conn = prev.conn;
                inner.user_by_conn.remove(&prev_conn);
            }
        }

        inner.user_by_conn.insert(conn, user_id.clone());
        inner.sessions.insert(
            user_id.clone(),
            Session { user_id: user_id.clone(), conn, location, route, last_seen: now },
        );
        debug!(user_id = %user_id, conn = %conn, "session_upserted");
    }

    /// Mutate only the location and last_seen of an active session
    pub fn update_location(&self, user_id: &UserId, location: Location) -> Result<(), UnknownUser> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(user_id) {
            Some(session) => {
                session.location = location;
                session.last_seen = Utc::now();
                Ok(())
            }
            None => Err(UnknownUser(user_id.clone())),
        }
    }

    /// Remove a session by user id, returning it if present
    pub fn remove(&self, user_id: &UserId) -> Option<Session> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(user_id)?;
        inner.user_by_conn.remove(&session.conn);
        info!(user_id = %user_id, "session_removed");
        Some(session)
    }

    /// Remove a session by transport handle
    ///
    /// Used when a connection closes without an explicit logout; resolves
    /// handle -> user id via the internal index.
    pub fn remove_by_connection(&self, conn: ConnId) -> Option<Session> {
        let mut inner = self.inner.lock();
        let user_id = inner.user_by_conn.remove(&conn)?;
        let session = inner.sessions.remove(&user_id);
        if session.is_some() {
            info!(user_id = %user_id, conn = %conn, "session_removed_by_disconnect");
        }
        session
    }

    /// Remove sessions idle longer than `ttl`, returning the removed set
    ///
    /// Advisory cleanup, run periodically rather than on every read.
    pub fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<Session> {
        let cutoff = now - ttl;
        let mut inner = self.inner.lock();

        let expired: Vec<UserId> = inner
            .sessions
            .values()
            .filter(|s| s.last_seen < cutoff)
            .map(|s| s.user_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for user_id in expired {
            if let Some(session) = inner.sessions.remove(&user_id) {
                inner.user_by_conn.remove(&session.conn);
                removed.push(session);
            }
        }

        if !removed.is_empty() {
            info!(count = %removed.len(), "sessions_swept");
        }
        removed
    }

    /// Point-in-time copy of all active sessions
    ///
    /// Callers iterate the snapshot, never the live map.
    pub fn list_active(&self) -> Vec<Session> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64) -> Location {
        Location::new(lat, lon)
    }

    fn uid(s: &str) -> UserId {
        UserId(s.to_string())
    }

    #[test]
    fn test_upsert_replaces_not_appends() {
        let registry = PresenceRegistry::new();
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));
        registry.upsert(uid("u1"), loc(2.0, 2.0), None, ConnId(1));

        let sessions = registry.list_active();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].location, loc(2.0, 2.0));
    }

    #[test]
    fn test_upsert_reconnect_drops_stale_handle() {
        let registry = PresenceRegistry::new();
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(2));

        // The old handle no longer resolves to the session
        assert!(registry.remove_by_connection(ConnId(1)).is_none());
        assert!(registry.remove_by_connection(ConnId(2)).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_location_requires_active_session() {
        let registry = PresenceRegistry::new();
        let err = registry.update_location(&uid("ghost"), loc(0.0, 0.0)).unwrap_err();
        assert_eq!(err, UnknownUser(uid("ghost")));

        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));
        assert!(registry.update_location(&uid("u1"), loc(3.0, 3.0)).is_ok());
        assert_eq!(registry.list_active()[0].location, loc(3.0, 3.0));
    }

    #[test]
    fn test_remove_does_not_resurrect() {
        let registry = PresenceRegistry::new();
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));
        assert!(registry.remove(&uid("u1")).is_some());

        // A later update must fail and must not recreate the session
        assert!(registry.update_location(&uid("u1"), loc(2.0, 2.0)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_idle_sessions() {
        let registry = PresenceRegistry::new();
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));
        registry.upsert(uid("u2"), loc(2.0, 2.0), None, ConnId(2));

        // Nothing is older than the 12h ttl right now
        let removed = registry.sweep(Utc::now(), Duration::hours(12));
        assert!(removed.is_empty());
        assert_eq!(registry.len(), 2);

        // From 13 hours in the future, everything is idle
        let removed = registry.sweep(Utc::now() + Duration::hours(13), Duration::hours(12));
        assert_eq!(removed.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_active_is_a_snapshot() {
        let registry = PresenceRegistry::new();
        registry.upsert(uid("u1"), loc(1.0, 1.0), None, ConnId(1));

        let snapshot = registry.list_active();
        registry.remove(&uid("u1"));

        // The copy is unaffected by later mutation
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
