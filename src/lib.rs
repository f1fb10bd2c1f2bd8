//! Camtrail - Cross-Camera Journey Correlation
//!
//! Stitches independent per-camera detection streams into unified
//! cross-camera journeys: when an object reappears on camera B shortly
//! after leaving camera A, the engine decides whether it is the same
//! physical object, using learned camera adjacency, transit-time
//! statistics and optional visual similarity.
//!
//! ## Architecture
//!
//! 1. Topology - camera graph: connections, zones, landmarks, inference
//! 2. Tracking - authoritative object registry (sightings, journeys)
//! 3. Correlation - the disappearance/reappearance matching engine
//! 4. Learning - transit-time refinement and topology suggestions
//! 5. Training - guided-walk recording and merge-back
//! 6. Discovery - scene-analysis intake and floor-plan projection
//! 7. Alerts - rule evaluation over engine events
//! 8. Hub - in-process event distribution
//! 9. CoreService - composition root and host-facing API
//!
//! ## Design Principles
//!
//! - Single writer: all detection events serialize through one engine
//! - The topology repository is the single source of truth for the graph
//! - External capabilities (storage, vision, language, alert delivery)
//!   are traits the host implements; none sit on the detection path

pub mod alerts;
pub mod config;
pub mod correlation;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod learning;
pub mod models;
pub mod service;
pub mod topology;
pub mod tracking;
pub mod training;

pub use error::{Error, Result};
pub use service::{CoreConfig, CoreService};
