//! Engine settings
//!
//! Plain policy structs the host loads from its settings store. Every
//! field has a working default so a freshly installed engine runs without
//! configuration.

use serde::{Deserialize, Serialize};

/// Correlation and lifecycle policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    /// Hard cap on how long after departure an arrival can still match (ms)
    pub correlation_window_ms: u64,
    /// Unseen in-transit objects become Lost after this long (ms)
    pub lost_timeout_ms: u64,
    /// Idle time on-camera before an object is considered departed (ms)
    pub presence_grace_ms: u64,
    /// Dwell on a single camera that triggers a loitering alert (ms)
    pub loitering_threshold_ms: u64,
    /// Minimum spacing between alerts for the same object (ms)
    pub object_alert_cooldown_ms: u64,
    /// Detections below this score never enter correlation
    pub min_detection_score: f64,
    /// Combined score a candidate must clear to claim an arrival
    pub correlation_threshold: f64,
    /// Blend embedding similarity into the score when available
    pub use_visual_matching: bool,
    /// Weight of the visual term when both embeddings are present
    pub visual_weight: f64,
    /// Refine connection transit times from observed journeys
    pub enable_transit_time_learning: bool,
    /// EMA smoothing factor for learned typical transit times
    pub transit_smoothing: f64,
    /// Record connection suggestions from unexplained movements
    pub enable_connection_suggestions: bool,
    /// Recurrences of a camera pair before a suggestion is raised
    pub min_connection_observations: u32,
    /// Minimum confidence for a pending connection suggestion
    pub min_connection_confidence: f64,
    /// Suggestions at or above this confidence apply without review
    pub auto_accept_threshold: f64,
    /// Minimum confidence for a pending landmark/zone suggestion
    pub landmark_confidence_threshold: f64,
    /// Retained Lost/Exited objects before the oldest are evicted
    pub max_archived_objects: usize,
    /// Engine deadline sweep cadence (ms)
    pub sweep_interval_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            correlation_window_ms: 120_000,
            lost_timeout_ms: 300_000,
            presence_grace_ms: 5_000,
            loitering_threshold_ms: 300_000,
            object_alert_cooldown_ms: 60_000,
            min_detection_score: 0.4,
            correlation_threshold: 0.4,
            use_visual_matching: true,
            visual_weight: 0.4,
            enable_transit_time_learning: true,
            transit_smoothing: 0.3,
            enable_connection_suggestions: true,
            min_connection_observations: 2,
            min_connection_confidence: 0.5,
            auto_accept_threshold: 0.85,
            landmark_confidence_threshold: 0.6,
            max_archived_objects: 1_000,
            sweep_interval_ms: 1_000,
        }
    }
}

/// Scene analysis worker policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    /// Fall back to the non-AI path when the generator fails or times out
    pub llm_fallback_enabled: bool,
    /// Per-call budget for description generation (ms)
    pub llm_fallback_timeout_ms: u64,
    /// Minimum spacing between analyses of the same camera (ms)
    pub llm_debounce_interval_ms: u64,
    /// Concurrent analysis calls across all cameras
    pub max_concurrent_analysis: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            llm_fallback_enabled: true,
            llm_fallback_timeout_ms: 15_000,
            llm_debounce_interval_ms: 30_000,
            max_concurrent_analysis: 2,
        }
    }
}

/// Spatial relationship inference policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferenceSettings {
    /// Cameras further apart than this never get an inferred edge (feet)
    pub proximity_feet: f64,
    /// Walking speed used to seed typical transit times (feet/sec)
    pub walking_speed_fps: f64,
    /// Extra tolerance beyond the FOV half-angle when testing facing (deg)
    pub facing_tolerance_deg: f64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            proximity_feet: 60.0,
            walking_speed_fps: 4.0,
            facing_tolerance_deg: 15.0,
        }
    }
}
