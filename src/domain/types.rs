//! Shared types for the saferoute gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype wrapper for user ids to provide type safety
///
/// User ids are caller-supplied opaque strings; the only structural
/// requirement is that they are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newtype wrapper for transport connection handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WGS84 point, optionally with a reported accuracy radius
///
/// Immutable value type. A new Location replaces the old one; locations are
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

/// Latitude or longitude outside the valid WGS84 range
///
/// Rejected at the message boundary; core operations never see an invalid
/// coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl std::fmt::Display for InvalidCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "coordinate out of range: lat={} lon={}", self.lat, self.lon)
    }
}

impl std::error::Error for InvalidCoordinate {}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, accuracy_m: None }
    }

    /// Boundary validation: lat in [-90, 90], lon in [-180, 180],
    /// accuracy non-negative when present
    pub fn validate(&self) -> Result<(), InvalidCoordinate> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lon_ok = self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon);
        let acc_ok = self.accuracy_m.map_or(true, |a| a.is_finite() && a >= 0.0);
        if lat_ok && lon_ok && acc_ok {
            Ok(())
        } else {
            Err(InvalidCoordinate { lat: self.lat, lon: self.lon })
        }
    }
}

/// One route alternative from the routing provider, read-only once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteCandidate {
    /// Ordered polyline of at least two points
    pub geometry: Vec<Location>,
    pub distance_km: f64,
    pub duration_min: f64,
    /// Opaque id assigned by the routing provider
    pub provider_route_id: String,
}

/// How the winning route was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    Safest,
    Shortest,
    Alternative,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Safest => "safest",
            RouteType::Shortest => "shortest",
            RouteType::Alternative => "alternative",
        }
    }
}

/// A route candidate with its safety scoring attached
///
/// Computed once by the aggregator and never recomputed after selection.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRoute {
    #[serde(flatten)]
    pub route: RouteCandidate,
    pub traffic_score: f64,
    pub cctv_score: f64,
    pub crowd_score: f64,
    pub safety_score: f64,
    pub route_type: RouteType,
}

/// Compact route description attached to a session at announce time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_score: Option<f64>,
}

/// Live server-side record of one connected user
///
/// Owned exclusively by the presence registry: created on the first
/// announce, mutated only via registry operations, removed on disconnect
/// or inactivity sweep.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub conn: ConnId,
    pub location: Location,
    pub route: Option<RouteSummary>,
    pub last_seen: DateTime<Utc>,
}

/// A nearby active session, projected per-query and never stored
#[derive(Debug, Clone, Serialize)]
pub struct CompanionMatch {
    pub user_id: UserId,
    pub distance_km: f64,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteSummary>,
}

/// Profile snapshot attached to an emergency alert for responders
///
/// Missing profile data degrades to the empty default; enrichment never
/// blocks alert delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emergency_contacts: Vec<String>,
}

/// Active-route snapshot attached to an emergency alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveRouteSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<UserId>,
}

/// An SOS event, created once and immutable thereafter
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyAlert {
    pub id: Uuid,
    pub user_id: UserId,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteSummary>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub user_profile: ProfileSnapshot,
    pub active_route: ActiveRouteSnapshot,
}

impl EmergencyAlert {
    pub fn new(
        user_id: UserId,
        location: Location,
        route: Option<RouteSummary>,
        message: String,
        user_profile: ProfileSnapshot,
        active_route: ActiveRouteSnapshot,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            location,
            route,
            message,
            timestamp: Utc::now(),
            user_profile,
            active_route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_validate_accepts_bounds() {
        assert!(Location::new(90.0, 180.0).validate().is_ok());
        assert!(Location::new(-90.0, -180.0).validate().is_ok());
        assert!(Location::new(0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_location_validate_rejects_out_of_range() {
        assert!(Location::new(90.01, 0.0).validate().is_err());
        assert!(Location::new(0.0, -180.5).validate().is_err());
        assert!(Location::new(f64::NAN, 0.0).validate().is_err());

        let mut loc = Location::new(0.0, 0.0);
        loc.accuracy_m = Some(-1.0);
        assert!(loc.validate().is_err());
    }

    #[test]
    fn test_route_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RouteType::Safest).unwrap(), "\"safest\"");
        assert_eq!(RouteType::Shortest.as_str(), "shortest");
    }

    #[test]
    fn test_scored_route_flattens_candidate_fields() {
        let scored = ScoredRoute {
            route: RouteCandidate {
                geometry: vec![Location::new(0.0, 0.0), Location::new(1.0, 1.0)],
                distance_km: 2.5,
                duration_min: 12.0,
                provider_route_id: "r0".to_string(),
            },
            traffic_score: 80.0,
            cctv_score: 60.0,
            crowd_score: 40.0,
            safety_score: 62.0,
            route_type: RouteType::Safest,
        };
        let v: serde_json::Value = serde_json::to_value(&scored).unwrap();
        assert_eq!(v["distance_km"], 2.5);
        assert_eq!(v["safety_score"], 62.0);
        assert_eq!(v["route_type"], "safest");
        assert_eq!(v["geometry"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_alert_defaults_when_enrichment_missing() {
        let alert = EmergencyAlert::new(
            UserId("u1".to_string()),
            Location::new(64.14, -21.94),
            None,
            "Emergency!".to_string(),
            ProfileSnapshot::default(),
            ActiveRouteSnapshot::default(),
        );
        let v: serde_json::Value = serde_json::to_value(&alert).unwrap();
        assert_eq!(v["user_id"], "u1");
        // The id serializes as a hyphenated uuid string
        assert!(Uuid::parse_str(v["id"].as_str().unwrap()).is_ok());
        // Empty sub-objects serialize as {} rather than being omitted
        assert!(v["user_profile"].as_object().unwrap().is_empty());
        assert!(v["active_route"].as_object().unwrap().is_empty());
    }
}
