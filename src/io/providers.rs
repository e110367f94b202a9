//! HTTP clients for the external scoring and routing providers
//!
//! Every provider is fallible and time-bounded; callers decide what a
//! failure means (the scoring aggregator substitutes neutral fallback
//! scores, the route API surfaces routing failures). The traits exist so
//! the scoring pipeline can be exercised with mock providers in tests.

use crate::domain::types::{Location, RouteCandidate};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// A provider call failed or could not be attempted
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The call exceeded its deadline
    Timeout,
    /// Transport or non-2xx response
    Http(String),
    /// Response body did not match the expected shape
    Decode(String),
    /// Provider requires configuration that is absent (e.g., API key)
    NotConfigured,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Timeout => write!(f, "provider call timed out"),
            ProviderError::Http(e) => write!(f, "provider http error: {e}"),
            ProviderError::Decode(e) => write!(f, "provider decode error: {e}"),
            ProviderError::NotConfigured => write!(f, "provider not configured"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Http(e.to_string())
        }
    }
}

/// Traffic flow sample at a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficFlow {
    pub current_speed: f64,
    pub free_flow_speed: f64,
}

/// Bounding box as (min_lon, min_lat, max_lon, max_lat)
pub type BBox = (f64, f64, f64, f64);

/// Routing provider returning route alternatives between two endpoints
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn fetch_candidates(
        &self,
        start: &Location,
        end: &Location,
    ) -> Result<Vec<RouteCandidate>, ProviderError>;
}

/// Traffic provider returning a flow sample for a point
#[async_trait]
pub trait TrafficProvider: Send + Sync {
    async fn flow_at(&self, point: &Location) -> Result<TrafficFlow, ProviderError>;
}

/// Point-feature provider counting map features within a corridor bbox
#[async_trait]
pub trait FeatureCountProvider: Send + Sync {
    async fn count_in_bbox(&self, bbox: BBox) -> Result<u32, ProviderError>;
    /// Full feature positions, used by the map layer endpoints
    async fn features_in_bbox(&self, bbox: BBox) -> Result<Vec<Location>, ProviderError>;
}

// ---------------------------------------------------------------------------
// OSRM-compatible routing client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON LineString, [lon, lat] pairs
    coordinates: Vec<[f64; 2]>,
}

fn candidates_from_osrm(resp: OsrmResponse) -> Result<Vec<RouteCandidate>, ProviderError> {
    if resp.code != "Ok" {
        return Err(ProviderError::Http(format!("osrm code {}", resp.code)));
    }
    Ok(resp
        .routes
        .into_iter()
        .enumerate()
        .map(|(i, route)| RouteCandidate {
            geometry: route
                .geometry
                .coordinates
                .iter()
                .map(|[lon, lat]| Location::new(*lat, *lon))
                .collect(),
            distance_km: route.distance / 1000.0,
            duration_min: route.duration / 60.0,
            provider_route_id: format!("osrm-{i}"),
        })
        .collect())
}

/// OSRM public API client (route alternatives, GeoJSON geometry)
pub struct OsrmClient {
    base_url: String,
    client: reqwest::Client,
}

impl OsrmClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }
}

#[async_trait]
impl RoutingProvider for OsrmClient {
    async fn fetch_candidates(
        &self,
        start: &Location,
        end: &Location,
    ) -> Result<Vec<RouteCandidate>, ProviderError> {
        let url = format!(
            "{}/route/v1/walking/{},{};{},{}",
            self.base_url, start.lon, start.lat, end.lon, end.lat
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "geojson"), ("alternatives", "true")])
            .send()
            .await?
            .error_for_status()?;
        let body: OsrmResponse = resp.json().await?;
        let candidates = candidates_from_osrm(body)?;
        debug!(count = %candidates.len(), "routing_candidates_fetched");
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Traffic flow client (TomTom flow-segment shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(rename = "flowSegmentData")]
    flow_segment_data: Option<FlowSegmentData>,
}

#[derive(Debug, Deserialize)]
struct FlowSegmentData {
    #[serde(rename = "currentSpeed")]
    current_speed: f64,
    #[serde(rename = "freeFlowSpeed")]
    free_flow_speed: f64,
}

fn flow_from_response(resp: FlowResponse) -> Result<TrafficFlow, ProviderError> {
    let data = resp
        .flow_segment_data
        .ok_or_else(|| ProviderError::Decode("missing flowSegmentData".to_string()))?;
    Ok(TrafficFlow { current_speed: data.current_speed, free_flow_speed: data.free_flow_speed })
}

/// Flow-segment traffic client; returns NotConfigured without an API key so
/// the aggregator's neutral fallback fires
pub struct TrafficFlowClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl TrafficFlowClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { url: url.to_string(), api_key: api_key.map(str::to_string), client }
    }
}

#[async_trait]
impl TrafficProvider for TrafficFlowClient {
    async fn flow_at(&self, point: &Location) -> Result<TrafficFlow, ProviderError> {
        let Some(ref key) = self.api_key else {
            return Err(ProviderError::NotConfigured);
        };
        let resp = self
            .client
            .get(&self.url)
            .query(&[("point", format!("{},{}", point.lat, point.lon)), ("key", key.clone())])
            .send()
            .await?
            .error_for_status()?;
        let body: FlowResponse = resp.json().await?;
        flow_from_response(body)
    }
}

// ---------------------------------------------------------------------------
// Overpass-compatible point-feature client
// ---------------------------------------------------------------------------

/// Which OpenStreetMap feature class a client counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Surveillance cameras
    Cctv,
    /// Emergency infrastructure (hospitals, police, fire stations)
    Infrastructure,
}

impl FeatureKind {
    fn selectors(&self) -> &'static str {
        match self {
            FeatureKind::Cctv => {
                "node[\"man_made\"=\"surveillance\"]({{bbox}});\n\
                 node[\"surveillance:type\"=\"camera\"]({{bbox}});"
            }
            FeatureKind::Infrastructure => {
                "node[\"amenity\"=\"hospital\"]({{bbox}});\n\
                 node[\"amenity\"=\"police\"]({{bbox}});\n\
                 node[\"amenity\"=\"fire_station\"]({{bbox}});\n\
                 node[\"amenity\"=\"ambulance_station\"]({{bbox}});\n\
                 node[\"emergency\"=\"yes\"]({{bbox}});"
            }
        }
    }

    fn query(&self) -> String {
        format!("[out:json];\n(\n{}\n);\nout;", self.selectors())
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
}

fn points_from_overpass(resp: OverpassResponse) -> Vec<Location> {
    resp.elements
        .into_iter()
        .filter_map(|e| match (e.lat, e.lon) {
            (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
            _ => None,
        })
        .collect()
}

/// Overpass API client scoped to one feature kind
pub struct OverpassClient {
    url: String,
    kind: FeatureKind,
    client: reqwest::Client,
}

impl OverpassClient {
    pub fn new(url: &str, kind: FeatureKind, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { url: url.to_string(), kind, client }
    }

    async fn fetch(&self, bbox: BBox) -> Result<Vec<Location>, ProviderError> {
        // Overpass bbox order is lat_min, lon_min, lat_max, lon_max
        let (min_lon, min_lat, max_lon, max_lat) = bbox;
        let bbox_param = format!("{min_lat},{min_lon},{max_lat},{max_lon}");
        let resp = self
            .client
            .get(&self.url)
            .query(&[("data", self.kind.query()), ("bbox", bbox_param)])
            .send()
            .await?
            .error_for_status()?;
        let body: OverpassResponse = resp.json().await?;
        Ok(points_from_overpass(body))
    }
}

#[async_trait]
impl FeatureCountProvider for OverpassClient {
    async fn count_in_bbox(&self, bbox: BBox) -> Result<u32, ProviderError> {
        let points = self.fetch(bbox).await?;
        debug!(kind = ?self.kind, count = %points.len(), "feature_count_fetched");
        Ok(points.len() as u32)
    }

    async fn features_in_bbox(&self, bbox: BBox) -> Result<Vec<Location>, ProviderError> {
        self.fetch(bbox).await
    }
}
