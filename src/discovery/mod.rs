//! Discovery - Scene Analysis & Floor-Plan Projection
//!
//! ## Responsibilities
//!
//! - Capability traits the host implements for vision and language models
//! - Debounced, concurrency-bounded analysis worker off the detection path
//! - Deterministic projection of discovered features onto the floor plan

pub mod projection;
mod service;
mod types;

pub use service::{DescriptionGenerator, DiscoveryService, SceneAnalyzer};
pub use types::{DiscoveryKind, DiscoveryObservation};
