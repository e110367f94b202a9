//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `presence_listener` - TCP listener for the live session transport
//! - `messages` - Typed wire schemas for the presence transport
//! - `http_api` - Route API, map layers, health, and Prometheus metrics
//! - `providers` - HTTP clients for routing, traffic, and map features
//! - `alert_store` - Emergency alert output to file (JSONL format)
//! - `profile_store` - User profile snapshots for alert enrichment

pub mod alert_store;
pub mod http_api;
pub mod messages;
pub mod presence_listener;
pub mod profile_store;
pub mod providers;

// Re-export commonly used types
pub use alert_store::AlertStore;
pub use http_api::{start_http_server, ApiContext};
pub use messages::{InboundMessage, OutboundMessage, RejectReason};
pub use presence_listener::start_presence_listener;
pub use profile_store::ProfileStore;
pub use providers::{
    FeatureCountProvider, FeatureKind, OsrmClient, OverpassClient, ProviderError,
    RoutingProvider, TrafficFlowClient, TrafficProvider,
};
