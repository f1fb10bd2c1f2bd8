//! Open transit candidates
//!
//! When an object leaves a camera, one candidate opens carrying an arrival
//! window per outgoing connection. Candidates are consumed by a match or
//! expired by the lost timeout, never both.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::TrackerSettings;
use crate::topology::Topology;
use crate::tracking::TrackedObject;

/// Predicted arrival interval on one destination camera
#[derive(Debug, Clone)]
pub struct ArrivalWindow {
    pub camera_id: String,
    pub connection_id: String,
    pub earliest: DateTime<Utc>,
    pub typical: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl ArrivalWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.earliest <= at && at <= self.latest
    }
}

/// One departed object waiting to reappear
#[derive(Debug, Clone)]
pub struct OpenTransitCandidate {
    pub global_id: Uuid,
    pub class_name: String,
    pub label: Option<String>,
    pub from_camera: String,
    /// Last sighting on the departure camera; windows anchor here
    pub departure: DateTime<Utc>,
    /// Embedding snapshot for visual scoring, when the object carried one
    pub embedding: Option<Vec<f32>>,
    pub windows: Vec<ArrivalWindow>,
    pub boundary_origin: bool,
    /// Past this instant the object resolves Lost (or Exited)
    pub deadline: DateTime<Utc>,
}

impl OpenTransitCandidate {
    /// Build the candidate for `object` departing its current camera.
    /// Windows cover every outgoing connection, each capped by the global
    /// correlation window. A camera with no outgoing connections yields an
    /// empty window list; the candidate can then only expire.
    pub fn open(object: &TrackedObject, topology: &Topology, settings: &TrackerSettings) -> Self {
        let from_camera = object
            .current_camera()
            .unwrap_or_default()
            .to_string();
        let departure = object.last_seen;
        let cap = Duration::milliseconds(settings.correlation_window_ms as i64);

        let mut windows = Vec::new();
        for conn in topology.neighbors(&from_camera) {
            let destination = if conn.from_camera == from_camera {
                conn.to_camera.clone()
            } else {
                conn.from_camera.clone()
            };
            let earliest = departure + Duration::milliseconds(conn.transit_time.min as i64);
            let typical = departure + Duration::milliseconds(conn.transit_time.typical as i64);
            let latest =
                departure + Duration::milliseconds(conn.transit_time.max as i64).min(cap);
            if latest < earliest {
                continue;
            }
            windows.push(ArrivalWindow {
                camera_id: destination,
                connection_id: conn.id.clone(),
                earliest,
                typical: typical.min(latest),
                latest,
            });
        }

        let boundary_origin = topology
            .camera(&from_camera)
            .map(|c| c.boundary)
            .unwrap_or(false);

        Self {
            global_id: object.global_id,
            class_name: object.class_name.clone(),
            label: object.label.clone(),
            from_camera,
            departure,
            embedding: object.latest_embedding().map(|e| e.to_vec()),
            windows,
            boundary_origin,
            deadline: departure + Duration::milliseconds(settings.lost_timeout_ms as i64),
        }
    }

    /// Window covering an arrival on `camera_id` at `at`, if any
    pub fn window_for(&self, camera_id: &str, at: DateTime<Utc>) -> Option<&ArrivalWindow> {
        self.windows
            .iter()
            .find(|w| w.camera_id == camera_id && w.contains(at))
    }

    /// Class/label hard filter. Labels only disqualify when both sides
    /// carry one and they differ.
    pub fn identity_compatible(&self, class_name: &str, label: Option<&str>) -> bool {
        if self.class_name != class_name {
            return false;
        }
        match (self.label.as_deref(), label) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Candidates keyed by global object id
#[derive(Default)]
pub struct CandidateSet {
    by_object: HashMap<Uuid, OpenTransitCandidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, candidate: OpenTransitCandidate) {
        self.by_object.insert(candidate.global_id, candidate);
    }

    pub fn remove(&mut self, global_id: &Uuid) -> Option<OpenTransitCandidate> {
        self.by_object.remove(global_id)
    }

    pub fn contains(&self, global_id: &Uuid) -> bool {
        self.by_object.contains_key(global_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpenTransitCandidate> {
        self.by_object.values()
    }

    /// Candidates whose deadline has passed, oldest first
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut expired: Vec<&OpenTransitCandidate> = self
            .by_object
            .values()
            .filter(|c| c.deadline <= now)
            .collect();
        expired.sort_by_key(|c| c.deadline);
        expired.iter().map(|c| c.global_id).collect()
    }

    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }
}
