//! Shared detection models
//!
//! This module contains the detection-event types shared across the
//! correlation, training, and discovery modules to avoid circular
//! dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Normalized bounding box (0.0-1.0 relative to frame size)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Horizontal center (0.0 = left edge, 1.0 = right edge)
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Vertical center (0.0 = top edge, 1.0 = bottom edge)
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Single detected object within a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    /// Detector class (person, car, dog, ...)
    pub class_name: String,
    /// Optional recognized identity (face/plate label)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Detector confidence 0.0-1.0
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Re-identification embedding, when the detector provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Detection batch from one camera at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    pub objects: Vec<DetectedObject>,
}

impl DetectionEvent {
    /// Reject events the engine must not ingest. Callers drop the whole
    /// event with a warning on error.
    pub fn validate(&self) -> Result<()> {
        if self.camera_id.trim().is_empty() {
            return Err(Error::Validation("detection event without camera id".into()));
        }
        for obj in &self.objects {
            if obj.class_name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "object without class on camera {}",
                    self.camera_id
                )));
            }
            if !obj.score.is_finite() || !(0.0..=1.0).contains(&obj.score) {
                return Err(Error::Validation(format!(
                    "object score {} out of range on camera {}",
                    obj.score, self.camera_id
                )));
            }
        }
        Ok(())
    }
}
