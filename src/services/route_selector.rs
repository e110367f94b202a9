//! Route selection - score all candidates, pick the safest
//!
//! Candidates are scored concurrently; selection is deterministic with
//! explicit tie-breaks so the same inputs always pick the same route.

use crate::domain::types::{RouteCandidate, RouteType, ScoredRoute};
use crate::services::scoring::SafetyScoreAggregator;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// No candidate survived scoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoRouteAvailable;

impl std::fmt::Display for NoRouteAvailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no route available")
    }
}

impl std::error::Error for NoRouteAvailable {}

/// Scores a candidate set and picks the winner
pub struct RouteSelector {
    aggregator: Arc<SafetyScoreAggregator>,
}

impl RouteSelector {
    pub fn new(aggregator: Arc<SafetyScoreAggregator>) -> Self {
        Self { aggregator }
    }

    /// Score every candidate concurrently, then select
    ///
    /// Scoring itself never fails per candidate; a scoring task that
    /// panics loses only that candidate. An empty candidate set is the
    /// one hard failure.
    pub async fn select(
        &self,
        candidates: Vec<RouteCandidate>,
    ) -> Result<ScoredRoute, NoRouteAvailable> {
        if candidates.is_empty() {
            return Err(NoRouteAvailable);
        }

        let mut tasks = JoinSet::new();
        for (index, candidate) in candidates.iter().cloned().enumerate() {
            let aggregator = self.aggregator.clone();
            tasks.spawn(async move { (index, aggregator.score(candidate).await) });
        }

        let mut scored: Vec<(usize, ScoredRoute)> = Vec::with_capacity(candidates.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => scored.push(entry),
                Err(e) => warn!(error = %e, "scoring_task_lost"),
            }
        }

        if scored.is_empty() {
            // All scoring tasks were lost; keep the caller moving with the
            // fastest candidate at neutral scores.
            warn!("scoring_unavailable: selecting shortest candidate");
            let fallback = candidates
                .into_iter()
                .min_by(|a, b| a.duration_min.total_cmp(&b.duration_min))
                .ok_or(NoRouteAvailable)?;
            return Ok(ScoredRoute {
                route: fallback,
                traffic_score: 50.0,
                cctv_score: 50.0,
                crowd_score: 50.0,
                safety_score: 50.0,
                route_type: RouteType::Shortest,
            });
        }

        scored.sort_by(|a, b| compare_scored(a, b));
        let (winner_index, mut winner) = scored.swap_remove(0);
        winner.route_type = RouteType::Safest;
        info!(
            candidate = %winner_index,
            route = %winner.route.provider_route_id,
            safety = %winner.safety_score,
            "route_selected"
        );
        Ok(winner)
    }
}

/// Safety descending, then duration ascending, then distance ascending,
/// then original candidate order
fn compare_scored(a: &(usize, ScoredRoute), b: &(usize, ScoredRoute)) -> Ordering {
    b.1.safety_score
        .total_cmp(&a.1.safety_score)
        .then_with(|| a.1.route.duration_min.total_cmp(&b.1.route.duration_min))
        .then_with(|| a.1.route.distance_km.total_cmp(&b.1.route.distance_km))
        .then_with(|| a.0.cmp(&b.0))
}
