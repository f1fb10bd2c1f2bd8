//! Tracking - Object State Registry
//!
//! ## Responsibilities
//!
//! - Object lifecycle states (Detected, InTransit, Lost, Exited)
//! - Sighting history and derived camera journeys
//! - Registry with live-state snapshots and capped terminal retention

mod registry;
mod types;

pub use registry::TrackingRegistry;
pub use types::{LiveTrackingState, ObjectState, ObjectSummary, Sighting, TrackedObject};
