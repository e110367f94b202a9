//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are
//! statistical counters only. Do NOT use them for coordination or logic
//! decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for the gateway
pub struct Metrics {
    /// Total presence events processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Inbound messages rejected at the boundary (malformed or invalid
    /// coordinates)
    inbound_rejected_total: AtomicU64,
    /// Inbound messages dropped because the hub channel was full
    inbound_dropped_total: AtomicU64,
    /// Route candidates scored (monotonic)
    routes_scored_total: AtomicU64,
    /// Per-provider fallback substitutions (monotonic)
    traffic_fallbacks_total: AtomicU64,
    cctv_fallbacks_total: AtomicU64,
    crowd_fallbacks_total: AtomicU64,
    /// Outbound messages targeted at connections (monotonic)
    broadcasts_total: AtomicU64,
    /// Outbound messages dropped because a connection channel was full
    broadcast_drops_total: AtomicU64,
    /// Emergency alerts constructed and fanned out (monotonic)
    emergency_alerts_total: AtomicU64,
    /// Operations referencing a user with no active session (monotonic)
    unknown_user_total: AtomicU64,
    /// Sessions removed by the inactivity sweep (monotonic)
    sessions_swept_total: AtomicU64,
    /// Current active session count (gauge, set by the hub)
    active_sessions: AtomicU64,
    /// Microseconds from `started` to the last report, for rate computation
    last_report_us: AtomicU64,
    started: Instant,
}

/// Point-in-time snapshot produced by `Metrics::report`
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub inbound_rejected_total: u64,
    pub inbound_dropped_total: u64,
    pub routes_scored_total: u64,
    pub traffic_fallbacks_total: u64,
    pub cctv_fallbacks_total: u64,
    pub crowd_fallbacks_total: u64,
    pub broadcasts_total: u64,
    pub broadcast_drops_total: u64,
    pub emergency_alerts_total: u64,
    pub unknown_user_total: u64,
    pub sessions_swept_total: u64,
    pub active_sessions: u64,
}

impl MetricsSummary {
    /// Log the summary as a single structured event
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.2}", self.events_per_sec),
            active_sessions = %self.active_sessions,
            broadcasts_total = %self.broadcasts_total,
            broadcast_drops = %self.broadcast_drops_total,
            routes_scored = %self.routes_scored_total,
            provider_fallbacks = %(self.traffic_fallbacks_total
                + self.cctv_fallbacks_total
                + self.crowd_fallbacks_total),
            emergency_alerts = %self.emergency_alerts_total,
            unknown_user = %self.unknown_user_total,
            sessions_swept = %self.sessions_swept_total,
            rejected = %self.inbound_rejected_total,
            "metrics_summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            inbound_rejected_total: AtomicU64::new(0),
            inbound_dropped_total: AtomicU64::new(0),
            routes_scored_total: AtomicU64::new(0),
            traffic_fallbacks_total: AtomicU64::new(0),
            cctv_fallbacks_total: AtomicU64::new(0),
            crowd_fallbacks_total: AtomicU64::new(0),
            broadcasts_total: AtomicU64::new(0),
            broadcast_drops_total: AtomicU64::new(0),
            emergency_alerts_total: AtomicU64::new(0),
            unknown_user_total: AtomicU64::new(0),
            sessions_swept_total: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            last_report_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_event_processed(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbound_rejected(&self) {
        self.inbound_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbound_dropped(&self) {
        self.inbound_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_route_scored(&self) {
        self.routes_scored_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_traffic_fallback(&self) {
        self.traffic_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cctv_fallback(&self) {
        self.cctv_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crowd_fallback(&self) {
        self.crowd_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcasts(&self, targeted: u64) {
        self.broadcasts_total.fetch_add(targeted, Ordering::Relaxed);
    }

    pub fn record_broadcast_drop(&self) {
        self.broadcast_drops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_alert(&self) {
        self.emergency_alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_user(&self) {
        self.unknown_user_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sessions_swept(&self, count: u64) {
        self.sessions_swept_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.store(count as u64, Ordering::Relaxed);
    }

    /// Produce a consistent snapshot and reset the per-interval counters
    pub fn report(&self) -> MetricsSummary {
        let now_us = self.started.elapsed().as_micros() as u64;
        let prev_us = self.last_report_us.swap(now_us, Ordering::Relaxed);
        let interval_us = now_us.saturating_sub(prev_us).max(1);

        let events_interval = self.events_since_report.swap(0, Ordering::Relaxed);
        let events_per_sec = events_interval as f64 / (interval_us as f64 / 1_000_000.0);

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            inbound_rejected_total: self.inbound_rejected_total.load(Ordering::Relaxed),
            inbound_dropped_total: self.inbound_dropped_total.load(Ordering::Relaxed),
            routes_scored_total: self.routes_scored_total.load(Ordering::Relaxed),
            traffic_fallbacks_total: self.traffic_fallbacks_total.load(Ordering::Relaxed),
            cctv_fallbacks_total: self.cctv_fallbacks_total.load(Ordering::Relaxed),
            crowd_fallbacks_total: self.crowd_fallbacks_total.load(Ordering::Relaxed),
            broadcasts_total: self.broadcasts_total.load(Ordering::Relaxed),
            broadcast_drops_total: self.broadcast_drops_total.load(Ordering::Relaxed),
            emergency_alerts_total: self.emergency_alerts_total.load(Ordering::Relaxed),
            unknown_user_total: self.unknown_user_total.load(Ordering::Relaxed),
            sessions_swept_total: self.sessions_swept_total.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_event_processed();
        metrics.record_event_processed();
        metrics.record_broadcasts(5);
        metrics.record_broadcast_drop();
        metrics.record_emergency_alert();
        metrics.set_active_sessions(3);

        let summary = metrics.report();
        assert_eq!(summary.events_total, 2);
        assert_eq!(summary.broadcasts_total, 5);
        assert_eq!(summary.broadcast_drops_total, 1);
        assert_eq!(summary.emergency_alerts_total, 1);
        assert_eq!(summary.active_sessions, 3);
    }

    #[test]
    fn test_report_resets_interval_counters_only() {
        let metrics = Metrics::new();
        metrics.record_event_processed();
        let first = metrics.report();
        assert_eq!(first.events_total, 1);

        let second = metrics.report();
        // Monotonic total survives the reset; the rate window does not
        assert_eq!(second.events_total, 1);
        assert_eq!(second.events_per_sec, 0.0);
    }

    #[test]
    fn test_fallback_counters_are_per_provider() {
        let metrics = Metrics::new();
        metrics.record_traffic_fallback();
        metrics.record_cctv_fallback();
        metrics.record_cctv_fallback();

        let summary = metrics.report();
        assert_eq!(summary.traffic_fallbacks_total, 1);
        assert_eq!(summary.cctv_fallbacks_total, 2);
        assert_eq!(summary.crowd_fallbacks_total, 0);
    }
}
