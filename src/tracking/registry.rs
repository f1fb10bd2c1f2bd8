//! Tracking state registry
//!
//! ## Responsibilities
//!
//! - Authoritative map of tracked objects by global id
//! - Live-state snapshots and journey queries
//! - Capped retention of terminal (Lost/Exited) objects
//!
//! The registry is plain data: the correlation engine owns it behind its
//! single write lock, which is what keeps cross-camera matching from
//! double-consuming an identity.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::types::{LiveTrackingState, ObjectState, ObjectSummary, TrackedObject};

pub struct TrackingRegistry {
    objects: HashMap<Uuid, TrackedObject>,
    /// Terminal objects in the order they finished, for eviction
    archived_order: VecDeque<Uuid>,
    max_archived: usize,
}

impl TrackingRegistry {
    pub fn new(max_archived: usize) -> Self {
        Self {
            objects: HashMap::new(),
            archived_order: VecDeque::new(),
            max_archived,
        }
    }

    pub fn insert(&mut self, object: TrackedObject) -> Uuid {
        let id = object.global_id;
        self.objects.insert(id, object);
        id
    }

    pub fn get(&self, global_id: &Uuid) -> Option<&TrackedObject> {
        self.objects.get(global_id)
    }

    pub fn get_mut(&mut self, global_id: &Uuid) -> Option<&mut TrackedObject> {
        self.objects.get_mut(global_id)
    }

    pub fn journey(&self, global_id: &Uuid) -> Option<Vec<String>> {
        self.objects.get(global_id).map(|o| o.journey.clone())
    }

    pub fn active(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values().filter(|o| o.state.is_active())
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.values_mut().filter(|o| o.state.is_active())
    }

    /// Active objects currently attributed to `camera_id`
    pub fn active_on_camera(&self, camera_id: &str) -> Vec<&TrackedObject> {
        self.objects
            .values()
            .filter(|o| o.state.is_active() && o.current_camera() == Some(camera_id))
            .collect()
    }

    /// Move an object into a terminal state and enforce the archive cap.
    pub fn finish(&mut self, global_id: &Uuid, state: ObjectState) {
        debug_assert!(state.is_terminal());
        if let Some(obj) = self.objects.get_mut(global_id) {
            obj.state = state;
            self.archived_order.push_back(*global_id);
            self.evict_over_cap();
        }
    }

    fn evict_over_cap(&mut self) {
        while self.archived_order.len() > self.max_archived {
            if let Some(oldest) = self.archived_order.pop_front() {
                if self.objects.remove(&oldest).is_some() {
                    debug!(global_id = %oldest, "Evicted archived object");
                }
            }
        }
    }

    pub fn live_state(&self, now: DateTime<Utc>) -> LiveTrackingState {
        let mut state = LiveTrackingState {
            generated_at: now,
            detected: 0,
            in_transit: 0,
            lost: 0,
            exited: 0,
            objects: Vec::new(),
        };
        for obj in self.objects.values() {
            match obj.state {
                ObjectState::Detected => state.detected += 1,
                ObjectState::InTransit => state.in_transit += 1,
                ObjectState::Lost => state.lost += 1,
                ObjectState::Exited => state.exited += 1,
            }
            if obj.state.is_active() {
                state.objects.push(ObjectSummary::from(obj));
            }
        }
        state.objects.sort_by_key(|o| o.first_seen);
        state
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
