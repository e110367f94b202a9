//! Profile snapshot lookup for emergency alert enrichment
//!
//! Reads a JSON file mapping user ids to profile and active-route
//! snapshots. The store is read-only from the gateway's point of view and
//! every lookup degrades to empty defaults - a missing file, a missing
//! user, or a parse error must never block an alert.

use crate::domain::types::{ActiveRouteSnapshot, ProfileSnapshot, UserId};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileRecord {
    #[serde(default)]
    profile: ProfileSnapshot,
    #[serde(default)]
    active_route: ActiveRouteSnapshot,
}

/// File-backed profile store, loaded once at startup
pub struct ProfileStore {
    records: FxHashMap<String, ProfileRecord>,
}

impl ProfileStore {
    /// Load the store from a JSON file of `{ "user_id": { profile, active_route } }`
    ///
    /// A missing or unparseable file yields an empty store with a warning.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Self {
        let Some(path) = path else {
            info!("profile_store_disabled");
            return Self { records: FxHashMap::default() };
        };
        let path = path.as_ref();

        let records = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<FxHashMap<String, ProfileRecord>>(&content)
            {
                Ok(records) => {
                    info!(file = %path.display(), users = %records.len(), "profile_store_loaded");
                    records
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "profile_store_parse_failed");
                    FxHashMap::default()
                }
            },
            Err(e) => {
                warn!(file = %path.display(), error = %e, "profile_store_read_failed");
                FxHashMap::default()
            }
        };

        Self { records }
    }

    /// Snapshot for a user; defaults when the user is unknown
    pub fn snapshot(&self, user_id: &UserId) -> (ProfileSnapshot, ActiveRouteSnapshot) {
        match self.records.get(user_id.as_str()) {
            Some(record) => (record.profile.clone(), record.active_route.clone()),
            None => (ProfileSnapshot::default(), ActiveRouteSnapshot::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_and_lookup() {
        let mut temp = NamedTempFile::new().unwrap();
        let content = r#"
        {
            "u1": {
                "profile": {
                    "name": "Anna",
                    "phone": "+354-555-0100",
                    "emergency_contacts": ["+354-555-0101"]
                },
                "active_route": { "destination": "Harpa" }
            }
        }
        "#;
        temp.write_all(content.as_bytes()).unwrap();
        temp.flush().unwrap();

        let store = ProfileStore::load(Some(temp.path()));
        let (profile, route) = store.snapshot(&UserId("u1".to_string()));
        assert_eq!(profile.name.as_deref(), Some("Anna"));
        assert_eq!(profile.emergency_contacts.len(), 1);
        assert_eq!(route.destination.as_deref(), Some("Harpa"));
    }

    #[test]
    fn test_unknown_user_defaults() {
        let store = ProfileStore::load(None::<&str>);
        let (profile, route) = store.snapshot(&UserId("nobody".to_string()));
        assert_eq!(profile, ProfileSnapshot::default());
        assert_eq!(route, ActiveRouteSnapshot::default());
    }

    #[test]
    fn test_missing_file_yields_empty_store() {
        let store = ProfileStore::load(Some("/nonexistent/profiles.json"));
        let (profile, _) = store.snapshot(&UserId("u1".to_string()));
        assert!(profile.name.is_none());
    }
}
