//! Tracked-object model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::BoundingBox;

/// Lifecycle state of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectState {
    /// Actively visible on some camera
    Detected,
    /// Departed a camera, arrival windows open
    InTransit,
    /// No plausible arrival before the timeout
    Lost,
    /// Departed through a boundary camera
    Exited,
}

impl ObjectState {
    pub fn is_active(&self) -> bool {
        matches!(self, ObjectState::Detected | ObjectState::InTransit)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// One observation of an object on one camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Object identity maintained across cameras
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedObject {
    pub global_id: Uuid,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub sightings: Vec<Sighting>,
    /// Camera sequence, one entry per camera change
    pub journey: Vec<String>,
    pub state: ObjectState,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// When the object appeared on its current camera (dwell anchor)
    pub camera_entered_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl TrackedObject {
    pub fn new(class_name: String, label: Option<String>, first: Sighting) -> Self {
        let timestamp = first.timestamp;
        let camera_id = first.camera_id.clone();
        Self {
            global_id: Uuid::new_v4(),
            class_name,
            label,
            sightings: vec![first],
            journey: vec![camera_id],
            state: ObjectState::Detected,
            first_seen: timestamp,
            last_seen: timestamp,
            camera_entered_at: timestamp,
            last_alert_at: None,
        }
    }

    pub fn current_camera(&self) -> Option<&str> {
        self.journey.last().map(String::as_str)
    }

    /// Append a sighting. The journey only grows when the camera differs
    /// from the previous one; repeated sightings on the same camera extend
    /// the dwell instead.
    pub fn record_sighting(&mut self, sighting: Sighting) {
        if self.current_camera() != Some(sighting.camera_id.as_str()) {
            self.journey.push(sighting.camera_id.clone());
            self.camera_entered_at = sighting.timestamp;
        }
        self.last_seen = sighting.timestamp;
        self.state = ObjectState::Detected;
        self.sightings.push(sighting);
    }

    pub fn dwell_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.camera_entered_at).num_milliseconds()
    }

    pub fn idle_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_milliseconds()
    }

    /// Most recent sighting that carried an embedding, if any
    pub fn latest_embedding(&self) -> Option<&[f32]> {
        self.sightings
            .iter()
            .rev()
            .find_map(|s| s.embedding.as_deref())
    }
}

/// Compact per-object view used in live-state snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub global_id: Uuid,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: ObjectState,
    pub journey: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_camera: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sighting_count: usize,
}

impl From<&TrackedObject> for ObjectSummary {
    fn from(obj: &TrackedObject) -> Self {
        Self {
            global_id: obj.global_id,
            class_name: obj.class_name.clone(),
            label: obj.label.clone(),
            state: obj.state,
            journey: obj.journey.clone(),
            current_camera: obj.current_camera().map(str::to_string),
            first_seen: obj.first_seen,
            last_seen: obj.last_seen,
            sighting_count: obj.sightings.len(),
        }
    }
}

/// Snapshot of everything currently tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTrackingState {
    pub generated_at: DateTime<Utc>,
    pub detected: usize,
    pub in_transit: usize,
    pub lost: usize,
    pub exited: usize,
    /// Active objects only; terminal objects are queryable by id
    pub objects: Vec<ObjectSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(camera: &str, at_ms: i64) -> Sighting {
        Sighting {
            camera_id: camera.to_string(),
            timestamp: DateTime::<Utc>::from_timestamp_millis(at_ms).unwrap(),
            score: 0.9,
            bounding_box: None,
            embedding: None,
        }
    }

    #[test]
    fn journey_grows_only_on_camera_change() {
        let mut obj = TrackedObject::new("person".to_string(), None, sighting("a", 0));
        obj.record_sighting(sighting("a", 1_000));
        obj.record_sighting(sighting("a", 2_000));
        assert_eq!(obj.journey, vec!["a"]);

        obj.record_sighting(sighting("b", 12_000));
        assert_eq!(obj.journey, vec!["a", "b"]);
        assert_eq!(obj.camera_entered_at.timestamp_millis(), 12_000);
        assert_eq!(obj.last_seen.timestamp_millis(), 12_000);
    }

    #[test]
    fn dwell_is_anchored_to_current_camera() {
        let mut obj = TrackedObject::new("person".to_string(), None, sighting("a", 0));
        obj.record_sighting(sighting("a", 30_000));
        let now = DateTime::<Utc>::from_timestamp_millis(45_000).unwrap();
        assert_eq!(obj.dwell_ms(now), 45_000);
        assert_eq!(obj.idle_ms(now), 15_000);

        obj.record_sighting(sighting("b", 50_000));
        assert_eq!(obj.dwell_ms(DateTime::<Utc>::from_timestamp_millis(52_000).unwrap()), 2_000);
    }

    #[test]
    fn latest_embedding_scans_backwards() {
        let mut obj = TrackedObject::new("person".to_string(), None, sighting("a", 0));
        let mut with_embedding = sighting("a", 1_000);
        with_embedding.embedding = Some(vec![0.5, 0.5]);
        obj.record_sighting(with_embedding);
        obj.record_sighting(sighting("a", 2_000));
        assert_eq!(obj.latest_embedding(), Some(&[0.5_f32, 0.5][..]));
    }
}
