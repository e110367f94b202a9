//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `hub` - Central event orchestrator for presence and emergencies
//! - `presence` - Concurrency-safe registry of live sessions
//! - `matcher` - Nearby-companion proximity queries
//! - `dispatcher` - Broadcast fan-out to connected sessions
//! - `scoring` - Safety score aggregation over provider signals
//! - `route_selector` - Concurrent candidate scoring and selection

pub mod dispatcher;
pub mod hub;
pub mod matcher;
pub mod presence;
pub mod route_selector;
pub mod scoring;

// Re-export commonly used types
pub use dispatcher::BroadcastDispatcher;
pub use hub::{HubEvent, PresenceHub};
pub use matcher::ProximityMatcher;
pub use presence::PresenceRegistry;
pub use route_selector::{NoRouteAvailable, RouteSelector};
pub use scoring::SafetyScoreAggregator;
