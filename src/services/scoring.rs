//! Safety score aggregation over external provider signals
//!
//! Converts up to three independently-fetched signals (traffic flow,
//! camera coverage, emergency infrastructure density) into one safety
//! score per route candidate. Every provider call is time-bounded and a
//! failure substitutes a fixed neutral fallback, so aggregation itself
//! never fails - a candidate always comes back scored.
//!
//! Fallback values are chosen so a single provider outage biases the
//! aggregate toward "unknown, proceed with caution" rather than
//! penalizing or over-rewarding a route.

use crate::domain::geo::bounding_box;
use crate::domain::types::{RouteCandidate, RouteType, ScoredRoute};
use crate::infra::metrics::Metrics;
use crate::io::providers::{
    BBox, FeatureCountProvider, ProviderError, TrafficFlow, TrafficProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Weighted combination: traffic 0.4, camera coverage 0.3, crowd 0.3
pub const TRAFFIC_WEIGHT: f64 = 0.4;
pub const CCTV_WEIGHT: f64 = 0.3;
pub const CROWD_WEIGHT: f64 = 0.3;

/// Neutral fallback scores per provider
pub const TRAFFIC_FALLBACK: f64 = 75.0;
pub const CCTV_FALLBACK: f64 = 50.0;
pub const CROWD_FALLBACK: f64 = 50.0;

/// Saturation counts: 5 cameras or 3 facilities reach the maximum score.
/// The source material also suggests a `(count/5)*10` reading; the
/// saturating interpretation is used here deliberately.
pub const CCTV_SATURATION_COUNT: f64 = 5.0;
pub const CROWD_SATURATION_COUNT: f64 = 3.0;

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Map a traffic flow sample to a 0-100 score (full speed = 100)
pub fn traffic_score_from_flow(flow: &TrafficFlow) -> f64 {
    if flow.free_flow_speed <= 0.0 {
        return TRAFFIC_FALLBACK;
    }
    clamp_score(100.0 * flow.current_speed / flow.free_flow_speed)
}

/// Map a camera count to a 0-100 score, saturating at 5 cameras
pub fn cctv_score_from_count(count: u32) -> f64 {
    clamp_score(100.0 * f64::from(count) / CCTV_SATURATION_COUNT)
}

/// Map an infrastructure count to a 0-100 score, saturating at 3 facilities
pub fn crowd_score_from_count(count: u32) -> f64 {
    clamp_score(100.0 * f64::from(count) / CROWD_SATURATION_COUNT)
}

/// Weighted combination, rounded to one decimal
pub fn combine_scores(traffic: f64, cctv: f64, crowd: f64) -> f64 {
    round1(TRAFFIC_WEIGHT * traffic + CCTV_WEIGHT * cctv + CROWD_WEIGHT * crowd)
}

/// Aggregates the three provider signals into a `ScoredRoute`
pub struct SafetyScoreAggregator {
    traffic: Arc<dyn TrafficProvider>,
    cctv: Arc<dyn FeatureCountProvider>,
    crowd: Arc<dyn FeatureCountProvider>,
    call_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl SafetyScoreAggregator {
    pub fn new(
        traffic: Arc<dyn TrafficProvider>,
        cctv: Arc<dyn FeatureCountProvider>,
        crowd: Arc<dyn FeatureCountProvider>,
        call_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { traffic, cctv, crowd, call_timeout, metrics }
    }

    /// Score one candidate; the three provider calls run concurrently
    ///
    /// Candidates are tagged `Alternative`; the selector re-tags the
    /// winner.
    pub async fn score(&self, candidate: RouteCandidate) -> ScoredRoute {
        let corridor = corridor_bbox(&candidate);
        let sample_point = candidate.geometry.first().cloned();

        let (traffic_raw, cctv_raw, crowd_raw) = tokio::join!(
            async {
                match sample_point {
                    Some(ref point) => flatten(
                        timeout(self.call_timeout, self.traffic.flow_at(point)).await,
                    ),
                    None => Err(ProviderError::Decode("empty geometry".to_string())),
                }
            },
            async { flatten(timeout(self.call_timeout, self.cctv.count_in_bbox(corridor)).await) },
            async { flatten(timeout(self.call_timeout, self.crowd.count_in_bbox(corridor)).await) },
        );

        let traffic_score = match traffic_raw {
            Ok(flow) => round1(traffic_score_from_flow(&flow)),
            Err(e) => {
                self.metrics.record_traffic_fallback();
                debug!(route = %candidate.provider_route_id, error = %e, "traffic_fallback");
                TRAFFIC_FALLBACK
            }
        };
        let cctv_score = match cctv_raw {
            Ok(count) => round1(cctv_score_from_count(count)),
            Err(e) => {
                self.metrics.record_cctv_fallback();
                debug!(route = %candidate.provider_route_id, error = %e, "cctv_fallback");
                CCTV_FALLBACK
            }
        };
        let crowd_score = match crowd_raw {
            Ok(count) => round1(crowd_score_from_count(count)),
            Err(e) => {
                self.metrics.record_crowd_fallback();
                debug!(route = %candidate.provider_route_id, error = %e, "crowd_fallback");
                CROWD_FALLBACK
            }
        };

        let safety_score = combine_scores(traffic_score, cctv_score, crowd_score);
        self.metrics.record_route_scored();
        debug!(
            route = %candidate.provider_route_id,
            traffic = %traffic_score,
            cctv = %cctv_score,
            crowd = %crowd_score,
            safety = %safety_score,
            "route_scored"
        );

        ScoredRoute {
            route: candidate,
            traffic_score,
            cctv_score,
            crowd_score,
            safety_score,
            route_type: RouteType::Alternative,
        }
    }
}

fn flatten<T>(
    result: Result<Result<T, ProviderError>, tokio::time::error::Elapsed>,
) -> Result<T, ProviderError> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(ProviderError::Timeout),
    }
}

fn corridor_bbox(candidate: &RouteCandidate) -> BBox {
    bounding_box(&candidate.geometry).unwrap_or((0.0, 0.0, 0.0, 0.0))
}
