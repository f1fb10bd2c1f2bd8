//! Suggestion store
//!
//! ## Responsibilities
//!
//! - Accumulate unexplained-movement evidence into connection suggestions
//! - Hold landmark/zone suggestions from scene discovery
//! - One-shot accept/reject with topology application
//! - Auto-accept above the configured confidence bar
//!
//! Evidence for a camera pair keeps building until the pair either gains
//! a topology edge or goes quiet long enough to be pruned.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrackerSettings;
use crate::discovery::projection;
use crate::discovery::{DiscoveryKind, DiscoveryObservation};
use crate::error::{Error, Result};
use crate::hub::{SuggestionMessage, SuggestionResolvedMessage, TrackingEvent, TrackingHub};
use crate::models::BoundingBox;
use crate::topology::{
    Landmark, LandmarkKind, TopologyService, TransitRange, Zone, ZoneKind,
};

const MAX_GAP_SAMPLES: usize = 20;
const EVIDENCE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Connection,
    Landmark,
    Zone,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Connection => "connection",
            SuggestionKind::Landmark => "landmark",
            SuggestionKind::Zone => "zone",
        }
    }
}

/// What accepting the suggestion adds to the topology
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SuggestionPayload {
    #[serde(rename_all = "camelCase")]
    Connection {
        from_camera: String,
        to_camera: String,
        transit_time: TransitRange,
    },
    #[serde(rename_all = "camelCase")]
    Landmark {
        camera: String,
        name: String,
        kind: LandmarkKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        bounding_box: Option<BoundingBox>,
        #[serde(skip_serializing_if = "Option::is_none")]
        distance_feet: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Zone {
        camera: String,
        name: String,
        kind: ZoneKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        bounding_box: Option<BoundingBox>,
        #[serde(skip_serializing_if = "Option::is_none")]
        distance_feet: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Uuid,
    pub kind: SuggestionKind,
    pub confidence: f64,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    pub evidence: serde_json::Value,
    pub payload: SuggestionPayload,
}

struct PairEvidence {
    count: u32,
    gaps_ms: Vec<u64>,
    best_confidence: f64,
    last_observed: DateTime<Utc>,
    /// A suggestion already exists for this pair
    suggested: bool,
}

#[derive(Default)]
struct SuggestState {
    movements: HashMap<(String, String), PairEvidence>,
    suggestions: HashMap<Uuid, Suggestion>,
}

/// SuggestionStore instance
pub struct SuggestionStore {
    settings: TrackerSettings,
    topology: Arc<TopologyService>,
    hub: Arc<TrackingHub>,
    state: RwLock<SuggestState>,
}

impl SuggestionStore {
    pub fn new(
        topology: Arc<TopologyService>,
        hub: Arc<TrackingHub>,
        settings: &TrackerSettings,
    ) -> Self {
        Self {
            settings: settings.clone(),
            topology,
            hub,
            state: RwLock::new(SuggestState::default()),
        }
    }

    /// Record one unexplained movement between two cameras. Raises a
    /// pending connection suggestion once the pair recurs often enough
    /// with sufficient confidence.
    pub async fn observe_movement(
        &self,
        from: &str,
        to: &str,
        gap_ms: u64,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.settings.enable_connection_suggestions {
            return Ok(());
        }

        let topology = self.topology.get().await;
        let key = (from.to_string(), to.to_string());
        if topology.find_connection(from, to).is_some() {
            // pair gained an edge; stale evidence must not resurface
            self.state.write().await.movements.remove(&key);
            return Ok(());
        }

        let raised = {
            let mut state = self.state.write().await;
            prune_stale(&mut state.movements, now);

            let entry = state.movements.entry(key).or_insert(PairEvidence {
                count: 0,
                gaps_ms: Vec::new(),
                best_confidence: 0.0,
                last_observed: now,
                suggested: false,
            });
            entry.count += 1;
            entry.last_observed = now;
            entry.best_confidence = entry.best_confidence.max(confidence);
            if entry.gaps_ms.len() >= MAX_GAP_SAMPLES {
                entry.gaps_ms.remove(0);
            }
            entry.gaps_ms.push(gap_ms);
            debug!(
                from,
                to,
                count = entry.count,
                confidence = entry.best_confidence,
                "Unexplained movement recorded"
            );

            if !entry.suggested
                && entry.count >= self.settings.min_connection_observations
                && entry.best_confidence >= self.settings.min_connection_confidence
            {
                entry.suggested = true;
                let mean_gap =
                    entry.gaps_ms.iter().sum::<u64>() / entry.gaps_ms.len().max(1) as u64;
                let suggestion = Suggestion {
                    id: Uuid::new_v4(),
                    kind: SuggestionKind::Connection,
                    confidence: entry.best_confidence,
                    status: SuggestionStatus::Pending,
                    created_at: now,
                    evidence: json!({
                        "observations": entry.count,
                        "meanGapMs": mean_gap,
                        "fromCamera": from,
                        "toCamera": to,
                    }),
                    payload: SuggestionPayload::Connection {
                        from_camera: from.to_string(),
                        to_camera: to.to_string(),
                        transit_time: TransitRange::around_typical(mean_gap),
                    },
                };
                let id = suggestion.id;
                let confidence = suggestion.confidence;
                state.suggestions.insert(id, suggestion);
                Some((id, confidence))
            } else {
                None
            }
        };

        if let Some((id, confidence)) = raised {
            info!(
                suggestion_id = %id,
                from,
                to,
                confidence,
                "Connection suggestion raised"
            );
            self.hub
                .publish(TrackingEvent::SuggestionRecorded(SuggestionMessage {
                    suggestion_id: id,
                    kind: SuggestionKind::Connection.as_str().to_string(),
                    confidence,
                }));
            if confidence >= self.settings.auto_accept_threshold {
                if let Err(e) = self.accept(id).await {
                    warn!(suggestion_id = %id, error = %e, "Auto-accept failed");
                }
            }
        }
        Ok(())
    }

    /// Record a landmark/zone observation from scene discovery. Returns
    /// the suggestion id when one was raised.
    pub async fn record_discovery(
        &self,
        observation: &DiscoveryObservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        if observation.confidence < self.settings.landmark_confidence_threshold {
            debug!(
                camera = %observation.camera,
                name = %observation.name,
                confidence = observation.confidence,
                "Discovery below confidence bar, dropped"
            );
            return Ok(None);
        }

        let topology = self.topology.get().await;
        if let Some(camera) = topology.resolve_camera(&observation.camera) {
            let already_mapped = topology.landmarks.iter().any(|l| {
                l.name.eq_ignore_ascii_case(&observation.name)
                    && l.visible_from.contains(&camera.id)
            });
            if observation.kind == DiscoveryKind::Landmark && already_mapped {
                debug!(camera = %camera.id, name = %observation.name, "Landmark already mapped");
                return Ok(None);
            }
        }

        let raised = {
            let mut state = self.state.write().await;
            let duplicate = state.suggestions.values().any(|s| {
                s.status == SuggestionStatus::Pending
                    && match &s.payload {
                        SuggestionPayload::Landmark { camera, name, .. }
                        | SuggestionPayload::Zone { camera, name, .. } => {
                            camera.eq_ignore_ascii_case(&observation.camera)
                                && name.eq_ignore_ascii_case(&observation.name)
                        }
                        SuggestionPayload::Connection { .. } => false,
                    }
            });
            if duplicate {
                None
            } else {
                let (kind, payload) = match observation.kind {
                    DiscoveryKind::Landmark => (
                        SuggestionKind::Landmark,
                        SuggestionPayload::Landmark {
                            camera: observation.camera.clone(),
                            name: observation.name.clone(),
                            kind: observation.landmark_kind.unwrap_or(LandmarkKind::Other),
                            bounding_box: observation.bounding_box.clone(),
                            distance_feet: observation.distance_feet,
                        },
                    ),
                    DiscoveryKind::Zone => (
                        SuggestionKind::Zone,
                        SuggestionPayload::Zone {
                            camera: observation.camera.clone(),
                            name: observation.name.clone(),
                            kind: observation.zone_kind.unwrap_or(ZoneKind::Dwell),
                            bounding_box: observation.bounding_box.clone(),
                            distance_feet: observation.distance_feet,
                        },
                    ),
                };
                let suggestion = Suggestion {
                    id: Uuid::new_v4(),
                    kind,
                    confidence: observation.confidence,
                    status: SuggestionStatus::Pending,
                    created_at: now,
                    evidence: json!({
                        "camera": observation.camera,
                        "description": observation.description,
                    }),
                    payload,
                };
                let id = suggestion.id;
                state.suggestions.insert(id, suggestion);
                Some((id, kind, observation.confidence))
            }
        };

        let Some((id, kind, confidence)) = raised else {
            return Ok(None);
        };
        info!(
            suggestion_id = %id,
            kind = kind.as_str(),
            camera = %observation.camera,
            name = %observation.name,
            "Discovery suggestion raised"
        );
        self.hub
            .publish(TrackingEvent::SuggestionRecorded(SuggestionMessage {
                suggestion_id: id,
                kind: kind.as_str().to_string(),
                confidence,
            }));
        if confidence >= self.settings.auto_accept_threshold {
            if let Err(e) = self.accept(id).await {
                warn!(suggestion_id = %id, error = %e, "Auto-accept failed");
            }
        }
        Ok(Some(id))
    }

    pub async fn connection_suggestions(&self) -> Vec<Suggestion> {
        self.pending_of(&[SuggestionKind::Connection]).await
    }

    pub async fn pending_landmark_suggestions(&self) -> Vec<Suggestion> {
        self.pending_of(&[SuggestionKind::Landmark, SuggestionKind::Zone])
            .await
    }

    async fn pending_of(&self, kinds: &[SuggestionKind]) -> Vec<Suggestion> {
        let state = self.state.read().await;
        let mut pending: Vec<Suggestion> = state
            .suggestions
            .values()
            .filter(|s| s.status == SuggestionStatus::Pending && kinds.contains(&s.kind))
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        pending
    }

    pub async fn get(&self, id: Uuid) -> Option<Suggestion> {
        self.state.read().await.suggestions.get(&id).cloned()
    }

    /// Apply the suggestion to the topology and mark it accepted. Exactly
    /// once: an already-resolved id reports not-found. Application errors
    /// (an unresolvable camera, say) leave the suggestion pending and the
    /// topology untouched.
    pub async fn accept(&self, id: Uuid) -> Result<Suggestion> {
        let mut state = self.state.write().await;
        let (payload, confidence) = {
            let suggestion = state
                .suggestions
                .get(&id)
                .filter(|s| s.status == SuggestionStatus::Pending)
                .ok_or_else(|| {
                    Error::NotFound(format!("suggestion {id} not found or already resolved"))
                })?;
            (suggestion.payload.clone(), suggestion.confidence)
        };

        self.apply_payload(&payload, confidence).await?;

        let suggestion = state
            .suggestions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("suggestion {id}")))?;
        suggestion.status = SuggestionStatus::Accepted;
        let resolved = suggestion.clone();
        drop(state);

        info!(suggestion_id = %id, kind = resolved.kind.as_str(), "Suggestion accepted");
        self.hub
            .publish(TrackingEvent::SuggestionResolved(SuggestionResolvedMessage {
                suggestion_id: id,
                accepted: true,
            }));
        Ok(resolved)
    }

    /// Mark the suggestion rejected. Same one-shot contract as accept.
    pub async fn reject(&self, id: Uuid) -> Result<Suggestion> {
        let mut state = self.state.write().await;
        let suggestion = state
            .suggestions
            .get_mut(&id)
            .filter(|s| s.status == SuggestionStatus::Pending)
            .ok_or_else(|| {
                Error::NotFound(format!("suggestion {id} not found or already resolved"))
            })?;
        suggestion.status = SuggestionStatus::Rejected;
        let resolved = suggestion.clone();
        drop(state);

        info!(suggestion_id = %id, kind = resolved.kind.as_str(), "Suggestion rejected");
        self.hub
            .publish(TrackingEvent::SuggestionResolved(SuggestionResolvedMessage {
                suggestion_id: id,
                accepted: false,
            }));
        Ok(resolved)
    }

    async fn apply_payload(&self, payload: &SuggestionPayload, confidence: f64) -> Result<()> {
        match payload.clone() {
            SuggestionPayload::Connection {
                from_camera,
                to_camera,
                transit_time,
            } => {
                self.topology
                    .apply(move |t| {
                        let from = t
                            .resolve_camera(&from_camera)
                            .ok_or_else(|| Error::Topology(format!("camera {from_camera} not found")))?
                            .id
                            .clone();
                        let to = t
                            .resolve_camera(&to_camera)
                            .ok_or_else(|| Error::Topology(format!("camera {to_camera} not found")))?
                            .id
                            .clone();
                        if t.find_connection(&from, &to).is_some() {
                            return Ok(());
                        }
                        let mut id = format!("conn-{from}-{to}");
                        if t.connections.iter().any(|c| c.id == id) {
                            id = format!("conn-{from}-{to}-{}", t.connections.len() + 1);
                        }
                        t.connections.push(crate::topology::Connection {
                            id,
                            from_camera: from,
                            to_camera: to,
                            bidirectional: true,
                            transit_time,
                            entry_zone: None,
                            exit_zone: None,
                        });
                        Ok(())
                    })
                    .await?;
            }
            SuggestionPayload::Landmark {
                camera,
                name,
                kind,
                bounding_box,
                distance_feet,
            } => {
                self.topology
                    .apply(move |t| {
                        let cam = t
                            .resolve_camera(&camera)
                            .ok_or_else(|| Error::Topology(format!("camera {camera} not found")))?
                            .clone();
                        let duplicate = t.landmarks.iter().any(|l| {
                            l.name.eq_ignore_ascii_case(&name)
                                && l.visible_from.contains(&cam.id)
                        });
                        if duplicate {
                            return Ok(());
                        }
                        let index = t
                            .landmarks
                            .iter()
                            .filter(|l| l.visible_from.contains(&cam.id))
                            .count();
                        let position = projection::place_landmark(
                            t,
                            &cam,
                            bounding_box.as_ref(),
                            distance_feet,
                            index,
                        );
                        t.landmarks.push(Landmark {
                            id: Uuid::new_v4().to_string(),
                            name,
                            kind,
                            position,
                            visible_from: vec![cam.id],
                            ai_suggested: true,
                            ai_confidence: Some(confidence),
                        });
                        Ok(())
                    })
                    .await?;
            }
            SuggestionPayload::Zone {
                camera,
                name,
                kind,
                bounding_box,
                distance_feet,
            } => {
                self.topology
                    .apply(move |t| {
                        let cam = t
                            .resolve_camera(&camera)
                            .ok_or_else(|| Error::Topology(format!("camera {camera} not found")))?
                            .clone();
                        let index = t
                            .zones
                            .iter()
                            .filter(|z| z.visible_from.contains(&cam.id))
                            .count();
                        let polygon = projection::zone_polygon(
                            t,
                            &cam,
                            bounding_box.as_ref(),
                            distance_feet,
                            index,
                        );
                        t.zones.push(Zone {
                            id: Uuid::new_v4().to_string(),
                            name,
                            kind,
                            polygon,
                            visible_from: vec![cam.id],
                            ai_suggested: true,
                            ai_confidence: Some(confidence),
                        });
                        Ok(())
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

fn prune_stale(movements: &mut HashMap<(String, String), PairEvidence>, now: DateTime<Utc>) {
    let cutoff = now - Duration::hours(EVIDENCE_TTL_HOURS);
    movements.retain(|_, e| e.last_observed >= cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Camera, MemoryTopologyStore, Topology};

    fn cam(id: &str, name: &str) -> Camera {
        Camera {
            id: id.to_string(),
            name: name.to_string(),
            position: None,
            field_of_view: None,
            boundary: false,
        }
    }

    async fn store_with_cameras() -> (Arc<SuggestionStore>, Arc<TopologyService>) {
        let topology = Arc::new(TopologyService::new(Arc::new(MemoryTopologyStore::new())));
        topology
            .replace(Topology {
                cameras: vec![cam("front", "Front Door"), cam("back", "Back Yard")],
                ..Topology::default()
            })
            .await
            .unwrap();
        let hub = Arc::new(TrackingHub::new(16));
        let store = Arc::new(SuggestionStore::new(
            topology.clone(),
            hub,
            &TrackerSettings::default(),
        ));
        (store, topology)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
    }

    #[tokio::test]
    async fn recurring_movement_raises_connection_suggestion() {
        let (store, _topology) = store_with_cameras().await;

        store
            .observe_movement("front", "back", 8_000, 0.7, at(0))
            .await
            .unwrap();
        assert!(store.connection_suggestions().await.is_empty());

        store
            .observe_movement("front", "back", 12_000, 0.7, at(60_000))
            .await
            .unwrap();
        let pending = store.connection_suggestions().await;
        assert_eq!(pending.len(), 1);
        match &pending[0].payload {
            SuggestionPayload::Connection { transit_time, .. } => {
                assert_eq!(transit_time.typical, 10_000);
                assert_eq!(transit_time.min, 5_000);
                assert_eq!(transit_time.max, 20_000);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        // a third recurrence does not raise a second suggestion
        store
            .observe_movement("front", "back", 9_000, 0.7, at(120_000))
            .await
            .unwrap();
        assert_eq!(store.connection_suggestions().await.len(), 1);
    }

    #[tokio::test]
    async fn high_confidence_movement_auto_accepts() {
        let (store, topology) = store_with_cameras().await;
        for i in 0..2 {
            store
                .observe_movement("front", "back", 10_000, 0.95, at(i * 30_000))
                .await
                .unwrap();
        }
        assert!(store.connection_suggestions().await.is_empty());
        assert!(topology
            .get()
            .await
            .find_connection("front", "back")
            .is_some());
    }

    #[tokio::test]
    async fn accept_is_one_shot() {
        let (store, topology) = store_with_cameras().await;
        store
            .observe_movement("front", "back", 10_000, 0.7, at(0))
            .await
            .unwrap();
        store
            .observe_movement("front", "back", 10_000, 0.7, at(30_000))
            .await
            .unwrap();
        let id = store.connection_suggestions().await[0].id;

        let accepted = store.accept(id).await.unwrap();
        assert_eq!(accepted.status, SuggestionStatus::Accepted);
        assert!(topology
            .get()
            .await
            .find_connection("front", "back")
            .is_some());

        assert!(matches!(store.accept(id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.reject(id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn unresolvable_camera_aborts_only_that_suggestion() {
        let (store, topology) = store_with_cameras().await;
        let observation = DiscoveryObservation {
            camera: "garage".to_string(),
            kind: DiscoveryKind::Landmark,
            name: "Mailbox".to_string(),
            landmark_kind: Some(LandmarkKind::Mailbox),
            zone_kind: None,
            confidence: 0.7,
            bounding_box: None,
            distance_feet: Some(12.0),
            description: None,
        };
        let id = store
            .record_discovery(&observation, at(0))
            .await
            .unwrap()
            .unwrap();

        let before = topology.revision().await;
        assert!(store.accept(id).await.is_err());
        assert_eq!(topology.revision().await, before);
        // still pending, host may retry after fixing the topology
        assert_eq!(store.pending_landmark_suggestions().await.len(), 1);
    }

    #[tokio::test]
    async fn discovery_gating_and_accept_path() {
        let (store, topology) = store_with_cameras().await;

        let low = DiscoveryObservation {
            camera: "Front Door".to_string(),
            kind: DiscoveryKind::Landmark,
            name: "Mailbox".to_string(),
            landmark_kind: Some(LandmarkKind::Mailbox),
            zone_kind: None,
            confidence: 0.3,
            bounding_box: None,
            distance_feet: Some(12.0),
            description: None,
        };
        assert!(store.record_discovery(&low, at(0)).await.unwrap().is_none());

        let ok = DiscoveryObservation {
            confidence: 0.7,
            ..low.clone()
        };
        let id = store.record_discovery(&ok, at(0)).await.unwrap().unwrap();
        // duplicate pending observation is not re-raised
        assert!(store.record_discovery(&ok, at(1_000)).await.unwrap().is_none());

        store.accept(id).await.unwrap();
        let t = topology.get().await;
        assert_eq!(t.landmarks.len(), 1);
        assert_eq!(t.landmarks[0].name, "Mailbox");
        assert!(t.landmarks[0].ai_suggested);
        assert_eq!(t.landmarks[0].visible_from, vec!["front".to_string()]);

        // once mapped, the same landmark is not suggested again
        assert!(store.record_discovery(&ok, at(2_000)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn movement_for_connected_pair_is_ignored() {
        let (store, topology) = store_with_cameras().await;
        for i in 0..2 {
            store
                .observe_movement("front", "back", 10_000, 0.95, at(i * 30_000))
                .await
                .unwrap();
        }
        let revision = topology.revision().await;

        // edge now exists; further movements accumulate nothing
        for i in 2..10 {
            store
                .observe_movement("front", "back", 10_000, 0.95, at(i * 30_000))
                .await
                .unwrap();
        }
        assert_eq!(topology.revision().await, revision);
        assert!(store.connection_suggestions().await.is_empty());
    }
}
