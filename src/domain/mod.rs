//! Domain models - core value types and geo math
//!
//! This module contains the canonical data types used throughout the system:
//! - `Location` / `RouteCandidate` / `ScoredRoute` - route computation values
//! - `Session` / `CompanionMatch` - presence and proximity values
//! - `EmergencyAlert` - immutable SOS record with enrichment snapshots
//! - `geo` - haversine distance and bounding-box helpers

pub mod geo;
pub mod types;
