//! Topology - Camera Network Model
//!
//! ## Responsibilities
//!
//! - Typed topology document (cameras, connections, zones, landmarks)
//! - Graph queries: neighbors, directional edge lookup, validation
//! - Pure spatial relationship inference from floor-plan geometry
//! - Authoritative in-memory repository with save-on-mutation and
//!   change notifications

mod graph;
mod infer;
mod store;
mod types;

pub use infer::infer_relationships;
pub use store::{MemoryTopologyStore, TopologyService, TopologyStore, TopologyUpdate};
pub use types::*;
