//! Typed wire schemas for the presence message transport
//!
//! Every inbound message maps to exactly one core operation; malformed or
//! out-of-range payloads are rejected here, before they reach the hub.
//! The transport is newline-delimited JSON with a `type` discriminator.

use crate::domain::types::{
    CompanionMatch, EmergencyAlert, InvalidCoordinate, Location, RouteSummary, UserId,
};
use serde::{Deserialize, Serialize};

fn default_max_distance_km() -> f64 {
    1.0
}

fn default_sos_message() -> String {
    "Emergency!".to_string()
}

/// Inbound client messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum InboundMessage {
    /// Register or replace the caller's presence
    #[serde(rename = "presence.announce")]
    Announce {
        user_id: UserId,
        location: Location,
        #[serde(default)]
        route: Option<RouteSummary>,
    },
    /// Live location delta for an already-announced user
    #[serde(rename = "presence.location_update")]
    LocationUpdate { user_id: UserId, location: Location },
    /// Nearby-companion query; reply-only, no broadcast
    #[serde(rename = "presence.find_companions")]
    FindCompanions {
        user_id: UserId,
        location: Location,
        #[serde(default = "default_max_distance_km")]
        max_distance_km: f64,
    },
    /// Emergency broadcast request
    #[serde(rename = "emergency.sos")]
    Sos {
        user_id: UserId,
        location: Location,
        #[serde(default)]
        route: Option<RouteSummary>,
        #[serde(default = "default_sos_message")]
        message: String,
    },
}

/// Why an inbound message was rejected at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    EmptyUserId,
    InvalidCoordinate(InvalidCoordinate),
    NegativeMaxDistance(f64),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyUserId => write!(f, "user_id must be non-empty"),
            RejectReason::InvalidCoordinate(e) => write!(f, "{e}"),
            RejectReason::NegativeMaxDistance(d) => {
                write!(f, "max_distance_km must be non-negative, got {d}")
            }
        }
    }
}

impl std::error::Error for RejectReason {}

impl InboundMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            InboundMessage::Announce { .. } => "presence.announce",
            InboundMessage::LocationUpdate { .. } => "presence.location_update",
            InboundMessage::FindCompanions { .. } => "presence.find_companions",
            InboundMessage::Sos { .. } => "emergency.sos",
        }
    }

    /// Boundary validation, applied before the message enters the core
    pub fn validate(&self) -> Result<(), RejectReason> {
        let (user_id, location) = match self {
            InboundMessage::Announce { user_id, location, .. } => (user_id, location),
            InboundMessage::LocationUpdate { user_id, location } => (user_id, location),
            InboundMessage::FindCompanions { user_id, location, max_distance_km } => {
                if !max_distance_km.is_finite() || *max_distance_km < 0.0 {
                    return Err(RejectReason::NegativeMaxDistance(*max_distance_km));
                }
                (user_id, location)
            }
            InboundMessage::Sos { user_id, location, .. } => (user_id, location),
        };

        if user_id.as_str().is_empty() {
            return Err(RejectReason::EmptyUserId);
        }
        location.validate().map_err(RejectReason::InvalidCoordinate)
    }
}

/// Outbound server messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Companion query result, sent to the requester only
    #[serde(rename = "presence.companions_found")]
    CompanionsFound {
        requester_user_id: UserId,
        count: usize,
        companions: Vec<CompanionMatch>,
    },
    /// Location delta from another user, sent to all other sessions
    #[serde(rename = "presence.companion_location_update")]
    CompanionLocationUpdate { user_id: UserId, location: Location },
    /// A user's session ended (disconnect or inactivity sweep)
    #[serde(rename = "presence.companion_offline")]
    CompanionOffline { user_id: UserId },
    /// Emergency alert, fanned out to every connected session
    #[serde(rename = "emergency.alert")]
    EmergencyAlert {
        #[serde(flatten)]
        alert: EmergencyAlert,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announce() {
        let json = r#"{"type":"presence.announce","user_id":"u1","location":{"lat":64.1,"lon":-21.9},"route":{"destination":"Harpa"}}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message_type(), "presence.announce");
        assert!(msg.validate().is_ok());
        match msg {
            InboundMessage::Announce { user_id, route, .. } => {
                assert_eq!(user_id.as_str(), "u1");
                assert_eq!(route.unwrap().destination.as_deref(), Some("Harpa"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_find_companions_defaults_radius() {
        let json =
            r#"{"type":"presence.find_companions","user_id":"u1","location":{"lat":0,"lon":0}}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        match msg {
            InboundMessage::FindCompanions { max_distance_km, .. } => {
                assert_eq!(max_distance_km, 1.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_sos_defaults_message() {
        let json = r#"{"type":"emergency.sos","user_id":"u1","location":{"lat":0,"lon":0}}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        match msg {
            InboundMessage::Sos { message, route, .. } => {
                assert_eq!(message, "Emergency!");
                assert!(route.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type":"presence.unknown","user_id":"u1"}"#;
        assert!(serde_json::from_str::<InboundMessage>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        let empty_user = r#"{"type":"presence.location_update","user_id":"","location":{"lat":0,"lon":0}}"#;
        let msg: InboundMessage = serde_json::from_str(empty_user).unwrap();
        assert_eq!(msg.validate(), Err(RejectReason::EmptyUserId));

        let bad_lat = r#"{"type":"presence.location_update","user_id":"u1","location":{"lat":91.0,"lon":0}}"#;
        let msg: InboundMessage = serde_json::from_str(bad_lat).unwrap();
        assert!(matches!(msg.validate(), Err(RejectReason::InvalidCoordinate(_))));

        let bad_radius = r#"{"type":"presence.find_companions","user_id":"u1","location":{"lat":0,"lon":0},"max_distance_km":-2.0}"#;
        let msg: InboundMessage = serde_json::from_str(bad_radius).unwrap();
        assert!(matches!(msg.validate(), Err(RejectReason::NegativeMaxDistance(_))));
    }

    #[test]
    fn test_outbound_tagging() {
        let out = OutboundMessage::CompanionOffline { user_id: UserId("u9".to_string()) };
        let v: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(v["type"], "presence.companion_offline");
        assert_eq!(v["user_id"], "u9");
    }
}
