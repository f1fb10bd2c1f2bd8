//! Discovery observation types
//!
//! Structured output the vision collaborator hands back after looking at
//! a camera's scene. The engine never touches imagery; it only consumes
//! these records.

use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;
use crate::topology::{LandmarkKind, ZoneKind};

/// What kind of floor-plan feature the analyzer reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    Landmark,
    Zone,
}

/// One feature spotted in a camera's scene
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryObservation {
    /// Camera reference: id, or display name as a fallback
    pub camera: String,
    pub kind: DiscoveryKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark_kind: Option<LandmarkKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_kind: Option<ZoneKind>,
    /// Analyzer confidence 0.0-1.0
    pub confidence: f64,
    /// Where in the frame the feature sits, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Estimated distance from the camera, in feet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_feet: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
