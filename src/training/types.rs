//! Training session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::BoundingBox;
use crate::topology::{LandmarkKind, ZoneKind};

/// Lifecycle of a guided training walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrainingState {
    Idle,
    Active,
    Paused,
    Completed,
}

/// Options accepted by `start`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingConfig {
    /// Gap under which consecutive sightings on one camera extend the same
    /// visit; defaults to the tracker's presence grace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_gap_ms: Option<u64>,
    /// Optional score gate; unset records every raw sighting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_min_score: Option<f64>,
}

/// One continuous presence on one camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingVisit {
    pub camera_id: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    pub sighting_count: usize,
}

impl TrainingVisit {
    pub fn overlaps(&self, other: &TrainingVisit) -> bool {
        self.entered_at <= other.exited_at && other.entered_at <= self.exited_at
    }
}

/// A landmark (or zone) the trainer called out mid-walk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingLandmarkMark {
    pub camera_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark_kind: Option<LandmarkKind>,
    /// Present when the mark describes a zone rather than a point landmark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_kind: Option<ZoneKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_feet: Option<f64>,
    pub marked_at: DateTime<Utc>,
}

/// Stats finalized by `end`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStats {
    pub cameras_visited: usize,
    pub transits_recorded: usize,
    pub landmarks_marked: usize,
    /// Time-overlapping visit pairs on different cameras, a sign of
    /// overlapping fields of view
    pub overlaps_detected: usize,
    pub average_transit_ms: f64,
    /// Distinct cameras visited over topology cameras, in [0, 100]
    pub coverage_percentage: f64,
}

/// Snapshot returned by the status query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub state: TrainingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub visit_count: usize,
    pub landmark_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TrainingStats>,
}

impl TrainingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingState::Idle => "idle",
            TrainingState::Active => "active",
            TrainingState::Paused => "paused",
            TrainingState::Completed => "completed",
        }
    }
}

impl TrainingStatus {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: TrainingState::Idle,
            trainer_name: None,
            started_at: None,
            ended_at: None,
            visit_count: 0,
            landmark_count: 0,
            stats: None,
        }
    }
}

/// Merge outcome of `apply_to_topology`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingApplyResult {
    pub success: bool,
    pub connections_created: usize,
    pub connections_updated: usize,
    pub landmarks_added: usize,
    pub zones_created: usize,
}
