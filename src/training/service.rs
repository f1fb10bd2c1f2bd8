//! Training session service
//!
//! ## Responsibilities
//!
//! - Guided-walk lifecycle: idle, active, paused, completed
//! - Raw visit recording from the live detection stream
//! - Final stats and the merge back into the topology
//!
//! Recording shares the detection stream with normal correlation but keeps
//! its own bookkeeping: every raw sighting lands in a visit, with none of
//! the score gating or alert cooldowns live tracking applies.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TrackerSettings;
use crate::discovery::projection;
use crate::error::{Error, Result};
use crate::hub::{TrackingEvent, TrackingHub, TrainingStatusMessage};
use crate::learning::TransitTimeLearner;
use crate::models::DetectionEvent;
use crate::topology::{Connection, Landmark, TopologyService, TransitRange, Zone};

use super::types::{
    TrainingApplyResult, TrainingConfig, TrainingLandmarkMark, TrainingState, TrainingStats,
    TrainingStatus, TrainingVisit,
};

struct TrainingSession {
    id: Uuid,
    trainer_name: Option<String>,
    config: TrainingConfig,
    state: TrainingState,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    visits: Vec<TrainingVisit>,
    landmarks: Vec<TrainingLandmarkMark>,
    stats: Option<TrainingStats>,
}

impl TrainingSession {
    fn status(&self) -> TrainingStatus {
        TrainingStatus {
            session_id: Some(self.id),
            state: self.state,
            trainer_name: self.trainer_name.clone(),
            started_at: Some(self.started_at),
            ended_at: self.ended_at,
            visit_count: self.visits.len(),
            landmark_count: self.landmarks.len(),
            stats: self.stats.clone(),
        }
    }
}

/// TrainingService instance
pub struct TrainingService {
    settings: TrackerSettings,
    topology: Arc<TopologyService>,
    learner: Arc<TransitTimeLearner>,
    hub: Arc<TrackingHub>,
    session: RwLock<Option<TrainingSession>>,
}

impl TrainingService {
    pub fn new(
        topology: Arc<TopologyService>,
        learner: Arc<TransitTimeLearner>,
        hub: Arc<TrackingHub>,
        settings: &TrackerSettings,
    ) -> Self {
        Self {
            settings: settings.clone(),
            topology,
            learner,
            hub,
            session: RwLock::new(None),
        }
    }

    /// Begin a session. Fails while one is active or paused; a completed
    /// session is replaced.
    pub async fn start(
        &self,
        trainer_name: Option<String>,
        config: Option<TrainingConfig>,
        now: DateTime<Utc>,
    ) -> Result<TrainingStatus> {
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            if matches!(session.state, TrainingState::Active | TrainingState::Paused) {
                return Err(Error::Conflict(format!(
                    "training session {} already in progress",
                    session.id
                )));
            }
        }

        let session = TrainingSession {
            id: Uuid::new_v4(),
            trainer_name,
            config: config.unwrap_or_default(),
            state: TrainingState::Active,
            started_at: now,
            ended_at: None,
            visits: Vec::new(),
            landmarks: Vec::new(),
            stats: None,
        };
        let status = session.status();
        info!(session_id = %session.id, "Training session started");
        *slot = Some(session);
        drop(slot);

        self.publish_status(&status);
        Ok(status)
    }

    pub async fn pause(&self) -> Result<TrainingStatus> {
        let status = self
            .transition(TrainingState::Active, TrainingState::Paused)
            .await?;
        self.publish_status(&status);
        Ok(status)
    }

    pub async fn resume(&self) -> Result<TrainingStatus> {
        let status = self
            .transition(TrainingState::Paused, TrainingState::Active)
            .await?;
        self.publish_status(&status);
        Ok(status)
    }

    async fn transition(&self, from: TrainingState, to: TrainingState) -> Result<TrainingStatus> {
        let mut slot = self.session.write().await;
        let session = slot
            .as_mut()
            .filter(|s| s.state == from)
            .ok_or_else(|| {
                Error::InvalidState(format!("no {} training session", from.as_str()))
            })?;
        session.state = to;
        info!(session_id = %session.id, state = to.as_str(), "Training session state changed");
        Ok(session.status())
    }

    /// Finalize the walk and compute its stats.
    pub async fn end(&self, now: DateTime<Utc>) -> Result<TrainingStatus> {
        let camera_total = self.topology.get().await.cameras.len();
        let mut slot = self.session.write().await;
        let session = slot
            .as_mut()
            .filter(|s| matches!(s.state, TrainingState::Active | TrainingState::Paused))
            .ok_or_else(|| Error::InvalidState("no training session in progress".into()))?;

        session.state = TrainingState::Completed;
        session.ended_at = Some(now);
        session.stats = Some(compute_stats(
            &session.visits,
            session.landmarks.len(),
            camera_total,
        ));
        let status = session.status();
        info!(
            session_id = %session.id,
            visits = session.visits.len(),
            cameras_visited = status.stats.as_ref().map(|s| s.cameras_visited).unwrap_or(0),
            "Training session completed"
        );
        drop(slot);

        self.publish_status(&status);
        Ok(status)
    }

    /// Drop the session and return to idle.
    pub async fn reset(&self) -> TrainingStatus {
        let mut slot = self.session.write().await;
        if let Some(session) = slot.take() {
            info!(session_id = %session.id, "Training session reset");
            self.hub
                .publish(TrackingEvent::TrainingStatusChanged(TrainingStatusMessage {
                    session_id: session.id,
                    status: TrainingState::Idle.as_str().to_string(),
                }));
        }
        TrainingStatus::idle()
    }

    /// Record a landmark called out by the trainer. Only valid mid-walk.
    pub async fn mark_landmark(&self, mark: TrainingLandmarkMark) -> Result<TrainingStatus> {
        if mark.camera_id.trim().is_empty() || mark.name.trim().is_empty() {
            return Err(Error::Validation(
                "landmark mark requires a camera and a name".into(),
            ));
        }
        let mut slot = self.session.write().await;
        let session = slot
            .as_mut()
            .filter(|s| s.state == TrainingState::Active)
            .ok_or_else(|| Error::InvalidState("no active training session".into()))?;
        debug!(
            session_id = %session.id,
            camera_id = %mark.camera_id,
            name = %mark.name,
            "Training landmark marked"
        );
        session.landmarks.push(mark);
        Ok(session.status())
    }

    /// Fold a detection event into the visit log. No-op unless a session
    /// is actively recording.
    pub async fn record_event(&self, event: &DetectionEvent) {
        {
            let slot = self.session.read().await;
            match slot.as_ref() {
                Some(s) if s.state == TrainingState::Active => {}
                _ => return,
            }
        }

        let mut slot = self.session.write().await;
        let Some(session) = slot.as_mut().filter(|s| s.state == TrainingState::Active) else {
            return;
        };
        let gap_ms = session
            .config
            .visit_gap_ms
            .unwrap_or(self.settings.presence_grace_ms) as i64;

        for object in &event.objects {
            if let Some(min) = session.config.record_min_score {
                if object.score < min {
                    continue;
                }
            }
            let extends_last = session.visits.last().map_or(false, |v| {
                v.camera_id == event.camera_id
                    && (event.timestamp - v.exited_at).num_milliseconds() <= gap_ms
            });
            if extends_last {
                if let Some(visit) = session.visits.last_mut() {
                    if event.timestamp > visit.exited_at {
                        visit.exited_at = event.timestamp;
                    }
                    visit.sighting_count += 1;
                }
            } else {
                session.visits.push(TrainingVisit {
                    camera_id: event.camera_id.clone(),
                    entered_at: event.timestamp,
                    exited_at: event.timestamp,
                    sighting_count: 1,
                });
            }
        }
    }

    pub async fn status(&self) -> TrainingStatus {
        self.session
            .read()
            .await
            .as_ref()
            .map(TrainingSession::status)
            .unwrap_or_else(TrainingStatus::idle)
    }

    /// Merge the recorded walk into the topology. Consecutive visits on an
    /// unconnected camera pair create a connection; pairs with an existing
    /// edge refine its transit time through the learner instead. Landmarks
    /// are added unless the camera already has one of the same name.
    pub async fn apply_to_topology(&self) -> Result<TrainingApplyResult> {
        let (visits, marks) = {
            let slot = self.session.read().await;
            match slot.as_ref() {
                Some(session) => (session.visits.clone(), session.landmarks.clone()),
                None => return Ok(TrainingApplyResult::default()),
            }
        };

        let mut result = TrainingApplyResult {
            success: true,
            ..TrainingApplyResult::default()
        };

        // partition transitions into refinements and new pairs
        let topology = self.topology.get().await;
        let mut refinements: Vec<(String, u64)> = Vec::new();
        let mut fresh: Vec<FreshPair> = Vec::new();
        for pair in visits.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.camera_id == next.camera_id {
                continue;
            }
            let gap_ms = (next.entered_at - prev.exited_at).num_milliseconds().max(0) as u64;
            if let Some(conn) = topology.find_connection(&prev.camera_id, &next.camera_id) {
                refinements.push((conn.id.clone(), gap_ms));
            } else {
                match fresh.iter_mut().find(|p| p.joins(&prev.camera_id, &next.camera_id)) {
                    Some(entry) => entry.gaps_ms.push(gap_ms),
                    None => fresh.push(FreshPair {
                        from: prev.camera_id.clone(),
                        to: next.camera_id.clone(),
                        gaps_ms: vec![gap_ms],
                    }),
                }
            }
        }

        if !fresh.is_empty() || !marks.is_empty() {
            let mut created = 0usize;
            let mut landmarks_added = 0usize;
            let mut zones_created = 0usize;
            self.topology
                .apply(|t| {
                    for pair in &fresh {
                        if t.resolve_camera(&pair.from).is_none()
                            || t.resolve_camera(&pair.to).is_none()
                        {
                            continue;
                        }
                        let mut id = format!("conn-{}-{}", pair.from, pair.to);
                        if t.connections.iter().any(|c| c.id == id) {
                            id = format!("conn-{}-{}-{}", pair.from, pair.to, t.connections.len() + 1);
                        }
                        t.connections.push(Connection {
                            id,
                            from_camera: pair.from.clone(),
                            to_camera: pair.to.clone(),
                            bidirectional: true,
                            transit_time: TransitRange::around_typical(pair.mean_gap_ms()),
                            entry_zone: None,
                            exit_zone: None,
                        });
                        created += 1;
                    }

                    for mark in &marks {
                        let Some(cam) = t.resolve_camera(&mark.camera_id).cloned() else {
                            continue;
                        };
                        if let Some(kind) = mark.zone_kind {
                            let duplicate = t.zones.iter().any(|z| {
                                z.name.eq_ignore_ascii_case(&mark.name)
                                    && z.visible_from.contains(&cam.id)
                            });
                            if duplicate {
                                continue;
                            }
                            let index = t
                                .zones
                                .iter()
                                .filter(|z| z.visible_from.contains(&cam.id))
                                .count();
                            let polygon = projection::zone_polygon(
                                t,
                                &cam,
                                mark.bounding_box.as_ref(),
                                mark.distance_feet,
                                index,
                            );
                            t.zones.push(Zone {
                                id: Uuid::new_v4().to_string(),
                                name: mark.name.clone(),
                                kind,
                                polygon,
                                visible_from: vec![cam.id],
                                ai_suggested: false,
                                ai_confidence: None,
                            });
                            zones_created += 1;
                        } else {
                            let duplicate = t.landmarks.iter().any(|l| {
                                l.name.eq_ignore_ascii_case(&mark.name)
                                    && l.visible_from.contains(&cam.id)
                            });
                            if duplicate {
                                continue;
                            }
                            let index = t
                                .landmarks
                                .iter()
                                .filter(|l| l.visible_from.contains(&cam.id))
                                .count();
                            let position = projection::place_landmark(
                                t,
                                &cam,
                                mark.bounding_box.as_ref(),
                                mark.distance_feet,
                                index,
                            );
                            t.landmarks.push(Landmark {
                                id: Uuid::new_v4().to_string(),
                                name: mark.name.clone(),
                                kind: mark.landmark_kind.unwrap_or(crate::topology::LandmarkKind::Other),
                                position,
                                visible_from: vec![cam.id],
                                ai_suggested: false,
                                ai_confidence: None,
                            });
                            landmarks_added += 1;
                        }
                    }
                    Ok(())
                })
                .await?;
            result.connections_created = created;
            result.landmarks_added = landmarks_added;
            result.zones_created = zones_created;
        }

        if self.learner.enabled() {
            let mut updated: HashSet<String> = HashSet::new();
            for (connection_id, gap_ms) in refinements {
                self.learner.observe(&connection_id, gap_ms).await?;
                updated.insert(connection_id);
            }
            result.connections_updated = updated.len();
        }

        info!(
            connections_created = result.connections_created,
            connections_updated = result.connections_updated,
            landmarks_added = result.landmarks_added,
            zones_created = result.zones_created,
            "Training merged into topology"
        );
        Ok(result)
    }

    fn publish_status(&self, status: &TrainingStatus) {
        if let Some(session_id) = status.session_id {
            self.hub
                .publish(TrackingEvent::TrainingStatusChanged(TrainingStatusMessage {
                    session_id,
                    status: status.state.as_str().to_string(),
                }));
        }
    }
}

struct FreshPair {
    from: String,
    to: String,
    gaps_ms: Vec<u64>,
}

impl FreshPair {
    fn joins(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    fn mean_gap_ms(&self) -> u64 {
        if self.gaps_ms.is_empty() {
            return 1_000;
        }
        let sum: u64 = self.gaps_ms.iter().sum();
        (sum / self.gaps_ms.len() as u64).max(1_000)
    }
}

fn compute_stats(
    visits: &[TrainingVisit],
    landmarks_marked: usize,
    camera_total: usize,
) -> TrainingStats {
    let cameras_visited = visits
        .iter()
        .map(|v| v.camera_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut overlaps_detected = 0;
    for (i, a) in visits.iter().enumerate() {
        for b in visits.iter().skip(i + 1) {
            if a.camera_id != b.camera_id && a.overlaps(b) {
                overlaps_detected += 1;
            }
        }
    }

    let gaps: Vec<i64> = visits
        .windows(2)
        .map(|w| (w[1].entered_at - w[0].exited_at).num_milliseconds().max(0))
        .collect();
    let average_transit_ms = if gaps.is_empty() {
        0.0
    } else {
        gaps.iter().sum::<i64>() as f64 / gaps.len() as f64
    };

    let coverage_percentage = if camera_total == 0 {
        0.0
    } else {
        (cameras_visited as f64 / camera_total as f64 * 100.0).clamp(0.0, 100.0)
    };

    TrainingStats {
        cameras_visited,
        transits_recorded: visits.len().saturating_sub(1),
        landmarks_marked,
        overlaps_detected,
        average_transit_ms,
        coverage_percentage,
    }
}
