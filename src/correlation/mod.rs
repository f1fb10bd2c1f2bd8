//! Cross-camera correlation
//!
//! Candidate bookkeeping, match scoring and the engine that ties them to
//! the topology, the transit learner and the suggestion store.

mod candidates;
mod engine;
mod scoring;

pub use candidates::{ArrivalWindow, CandidateSet, OpenTransitCandidate};
pub use engine::{CorrelationEngine, EngineStats};
pub use scoring::{cosine_similarity, score_arrival, temporal_plausibility, MatchScore};
