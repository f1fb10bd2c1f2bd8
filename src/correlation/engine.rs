//! Correlation engine
//!
//! ## Responsibilities
//!
//! - Serialize detection intake and drive the object state machine
//! - Match arrivals against open transit candidates (best score wins)
//! - Sweep deadlines: departures after grace, Lost/Exited after timeout
//! - Feed confirmed transits to the learner and unexplained movements to
//!   the suggestion store
//!
//! One write lock over registry + candidates is the single authority for
//! identity: a candidate is consumed by a match or expired by the sweep,
//! never both. Deadlines live in the data and are evaluated by the sweep,
//! so stopping the loop cancels every outstanding timer at once and a
//! stop/start cycle is atomic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::hub::{
    LoiteringAlertMessage, ObjectDetectedMessage, ObjectFinishedMessage, ObjectMatchedMessage,
    TrackingEvent, TrackingHub, TransitStartedMessage,
};
use crate::learning::{SuggestionStore, TransitTimeLearner};
use crate::models::{DetectedObject, DetectionEvent};
use crate::topology::{Topology, TopologyService};
use crate::tracking::{LiveTrackingState, ObjectState, Sighting, TrackedObject, TrackingRegistry};

use super::candidates::{CandidateSet, OpenTransitCandidate};
use super::scoring;

/// Engine counters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub events_processed: u64,
    pub events_dropped: u64,
    pub objects_created: u64,
    pub matches: u64,
    pub lost: u64,
    pub exited: u64,
    pub loiter_alerts: u64,
}

struct EngineState {
    registry: TrackingRegistry,
    candidates: CandidateSet,
    stats: EngineStats,
}

/// Side effects collected under the state lock, dispatched after release
#[derive(Default)]
struct Effects {
    events: Vec<TrackingEvent>,
    transits: Vec<TransitEvidence>,
    movements: Vec<MovementEvidence>,
}

struct TransitEvidence {
    connection_id: String,
    observed_ms: u64,
}

struct MovementEvidence {
    from_camera: String,
    to_camera: String,
    gap_ms: u64,
    confidence: f64,
    at: DateTime<Utc>,
}

/// CorrelationEngine instance
pub struct CorrelationEngine {
    settings: TrackerSettings,
    topology: Arc<TopologyService>,
    learner: Arc<TransitTimeLearner>,
    suggestions: Arc<SuggestionStore>,
    hub: Arc<TrackingHub>,
    state: RwLock<EngineState>,
    running: RwLock<bool>,
    intake: RwLock<Option<mpsc::UnboundedSender<DetectionEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CorrelationEngine {
    pub fn new(
        settings: &TrackerSettings,
        topology: Arc<TopologyService>,
        learner: Arc<TransitTimeLearner>,
        suggestions: Arc<SuggestionStore>,
        hub: Arc<TrackingHub>,
    ) -> Self {
        Self {
            settings: settings.clone(),
            topology,
            learner,
            suggestions,
            hub,
            state: RwLock::new(EngineState {
                registry: TrackingRegistry::new(settings.max_archived_objects),
                candidates: CandidateSet::new(),
                stats: EngineStats::default(),
            }),
            running: RwLock::new(false),
            intake: RwLock::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the event loop: detection intake plus the deadline sweep.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Correlation engine already running");
                return;
            }
            *running = true;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.intake.write().await = Some(tx);
        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            engine.run_loop(rx).await;
        });
        *self.worker.lock().await = Some(handle);
        info!(
            sweep_interval_ms = self.settings.sweep_interval_ms,
            "Correlation engine started"
        );
    }

    /// Stop the loop and join it. After return no sweep or event delivery
    /// survives, so start() gives a fresh run over the retained state.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }
        self.intake.write().await.take();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Engine worker join failed");
            }
        }
        info!("Correlation engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Queue one detection event for the engine loop.
    pub async fn submit(&self, event: DetectionEvent) -> Result<()> {
        match self.intake.read().await.as_ref() {
            Some(tx) => tx
                .send(event)
                .map_err(|_| Error::InvalidState("correlation engine stopped".into())),
            None => Err(Error::InvalidState(
                "correlation engine not running".into(),
            )),
        }
    }

    async fn run_loop(self: Arc<Self>, mut intake: mpsc::UnboundedReceiver<DetectionEvent>) {
        let period = std::time::Duration::from_millis(self.settings.sweep_interval_ms.max(100));
        let mut sweep = tokio::time::interval(period);
        loop {
            tokio::select! {
                received = intake.recv() => match received {
                    Some(event) => self.process_event(event).await,
                    None => break,
                },
                _ = sweep.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    self.sweep(Utc::now()).await;
                }
            }
        }
        debug!("Correlation engine loop exited");
    }

    /// Ingest one detection batch. Public so hosts and tests can drive the
    /// engine with explicit timestamps (replays, deterministic checks);
    /// the background loop calls this for every queued event.
    pub async fn process_event(&self, event: DetectionEvent) {
        let topology = self.topology.get().await;
        let mut effects = Effects::default();
        {
            let mut state = self.state.write().await;
            if let Err(e) = event.validate() {
                state.stats.events_dropped += 1;
                warn!(error = %e, "Dropping malformed detection event");
                return;
            }
            state.stats.events_processed += 1;
            for object in &event.objects {
                if object.score < self.settings.min_detection_score {
                    debug!(
                        camera_id = %event.camera_id,
                        class_name = %object.class_name,
                        score = object.score,
                        "Detection below score gate"
                    );
                    continue;
                }
                self.ingest_object(&mut state, &topology, &event, object, &mut effects);
            }
        }
        self.dispatch(effects).await;
    }

    /// Evaluate deadlines at `now`: grace-expired departures and
    /// timeout-expired candidates. Driven by the loop; callable directly
    /// with a chosen clock.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let topology = self.topology.get().await;
        let mut effects = Effects::default();
        {
            let mut state = self.state.write().await;
            self.open_departures(&mut state, &topology, now, &mut effects);
            self.expire_candidates(&mut state, now, &mut effects);
        }
        self.dispatch(effects).await;
    }

    pub async fn live_state(&self, now: DateTime<Utc>) -> LiveTrackingState {
        self.state.read().await.registry.live_state(now)
    }

    pub async fn journey(&self, global_id: &Uuid) -> Option<Vec<String>> {
        self.state.read().await.registry.journey(global_id)
    }

    pub async fn stats(&self) -> EngineStats {
        self.state.read().await.stats.clone()
    }

    pub async fn open_candidates(&self) -> usize {
        self.state.read().await.candidates.len()
    }

    fn ingest_object(
        &self,
        state: &mut EngineState,
        topology: &Topology,
        event: &DetectionEvent,
        object: &DetectedObject,
        effects: &mut Effects,
    ) {
        let sighting = Sighting {
            camera_id: event.camera_id.clone(),
            timestamp: event.timestamp,
            score: object.score,
            bounding_box: object.bounding_box.clone(),
            embedding: object.embedding.clone(),
        };

        if let Some(global_id) = self.find_on_camera(state, &event.camera_id, object) {
            self.continue_presence(state, global_id, sighting, object, effects);
            return;
        }

        if let Some(won) = self.match_arrival(state, event, object) {
            self.absorb_arrival(state, won, sighting, object, event, effects);
            return;
        }

        self.record_movement_evidence(state, topology, event, object, effects);

        let entered_boundary = topology
            .camera(&event.camera_id)
            .map(|c| c.boundary)
            .unwrap_or(false);
        let tracked = TrackedObject::new(object.class_name.clone(), object.label.clone(), sighting);
        let global_id = tracked.global_id;
        state.registry.insert(tracked);
        state.stats.objects_created += 1;
        debug!(
            global_id = %global_id,
            camera_id = %event.camera_id,
            class_name = %object.class_name,
            "New tracked object"
        );

        let message = ObjectDetectedMessage {
            global_id,
            camera_id: event.camera_id.clone(),
            class_name: object.class_name.clone(),
            score: object.score,
            timestamp: event.timestamp,
        };
        effects.events.push(TrackingEvent::ObjectDetected(message.clone()));
        if entered_boundary {
            effects.events.push(TrackingEvent::ObjectEntered(message));
        }
    }

    /// Active object on this camera with a compatible identity, most
    /// recently seen first. Covers both Detected dwell and an InTransit
    /// object reappearing where it departed.
    fn find_on_camera(
        &self,
        state: &EngineState,
        camera_id: &str,
        object: &DetectedObject,
    ) -> Option<Uuid> {
        state
            .registry
            .active_on_camera(camera_id)
            .into_iter()
            .filter(|o| {
                o.class_name == object.class_name
                    && labels_compatible(o.label.as_deref(), object.label.as_deref())
            })
            .max_by_key(|o| o.last_seen)
            .map(|o| o.global_id)
    }

    fn continue_presence(
        &self,
        state: &mut EngineState,
        global_id: Uuid,
        sighting: Sighting,
        object: &DetectedObject,
        effects: &mut Effects,
    ) {
        // seen again: any open candidate for it is moot
        state.candidates.remove(&global_id);

        let Some(tracked) = state.registry.get_mut(&global_id) else {
            return;
        };
        let timestamp = sighting.timestamp;
        tracked.record_sighting(sighting);
        if tracked.label.is_none() && object.label.is_some() {
            tracked.label = object.label.clone();
        }

        let dwell_ms = tracked.dwell_ms(timestamp);
        if dwell_ms >= self.settings.loitering_threshold_ms as i64 {
            let cooled = tracked.last_alert_at.map_or(true, |prev| {
                (timestamp - prev).num_milliseconds()
                    >= self.settings.object_alert_cooldown_ms as i64
            });
            if cooled {
                tracked.last_alert_at = Some(timestamp);
                state.stats.loiter_alerts += 1;
                effects
                    .events
                    .push(TrackingEvent::LoiteringAlert(LoiteringAlertMessage {
                        global_id,
                        camera_id: tracked
                            .current_camera()
                            .unwrap_or_default()
                            .to_string(),
                        class_name: tracked.class_name.clone(),
                        dwell_ms,
                    }));
            }
        }
    }

    /// Best candidate whose window covers this arrival and whose combined
    /// score clears the threshold.
    fn match_arrival(
        &self,
        state: &EngineState,
        event: &DetectionEvent,
        object: &DetectedObject,
    ) -> Option<ArrivalWin> {
        let mut best: Option<ArrivalWin> = None;
        for candidate in state.candidates.iter() {
            if !candidate.identity_compatible(&object.class_name, object.label.as_deref()) {
                continue;
            }
            let Some(window) = candidate.window_for(&event.camera_id, event.timestamp) else {
                continue;
            };
            let score = scoring::score_arrival(
                candidate,
                window,
                event.timestamp,
                object.embedding.as_deref(),
                &self.settings,
            );
            if score.combined < self.settings.correlation_threshold {
                continue;
            }
            if best
                .as_ref()
                .map_or(true, |b| score.combined > b.confidence)
            {
                best = Some(ArrivalWin {
                    global_id: candidate.global_id,
                    connection_id: window.connection_id.clone(),
                    from_camera: candidate.from_camera.clone(),
                    departure: candidate.departure,
                    confidence: score.combined,
                });
            }
        }
        best
    }

    fn absorb_arrival(
        &self,
        state: &mut EngineState,
        won: ArrivalWin,
        sighting: Sighting,
        object: &DetectedObject,
        event: &DetectionEvent,
        effects: &mut Effects,
    ) {
        state.candidates.remove(&won.global_id);
        let Some(tracked) = state.registry.get_mut(&won.global_id) else {
            return;
        };
        tracked.record_sighting(sighting);
        if tracked.label.is_none() && object.label.is_some() {
            tracked.label = object.label.clone();
        }
        state.stats.matches += 1;

        let transit_ms = (event.timestamp - won.departure).num_milliseconds();
        info!(
            global_id = %won.global_id,
            from_camera = %won.from_camera,
            to_camera = %event.camera_id,
            confidence = won.confidence,
            transit_ms,
            "Cross-camera match"
        );
        effects
            .events
            .push(TrackingEvent::ObjectMatched(ObjectMatchedMessage {
                global_id: won.global_id,
                from_camera: won.from_camera,
                to_camera: event.camera_id.clone(),
                connection_id: won.connection_id.clone(),
                confidence: won.confidence,
                transit_ms,
                journey: tracked.journey.clone(),
            }));
        effects.transits.push(TransitEvidence {
            connection_id: won.connection_id,
            observed_ms: transit_ms.max(0) as u64,
        });
    }

    /// A new identity appearing while candidates are open elsewhere is
    /// evidence of an unmapped walkway. The candidates stay open: the
    /// evidence is only a hint until the pair recurs.
    fn record_movement_evidence(
        &self,
        state: &EngineState,
        topology: &Topology,
        event: &DetectionEvent,
        object: &DetectedObject,
        effects: &mut Effects,
    ) {
        if !self.settings.enable_connection_suggestions {
            return;
        }
        for candidate in state.candidates.iter() {
            if candidate.from_camera == event.camera_id
                || !candidate.identity_compatible(&object.class_name, object.label.as_deref())
            {
                continue;
            }
            let gap_ms = (event.timestamp - candidate.departure).num_milliseconds();
            if gap_ms <= 0 || gap_ms > self.settings.correlation_window_ms as i64 {
                continue;
            }
            if topology
                .find_connection(&candidate.from_camera, &event.camera_id)
                .is_some()
            {
                continue;
            }
            let visual = match (candidate.embedding.as_deref(), object.embedding.as_deref()) {
                (Some(a), Some(b)) => scoring::cosine_similarity(a, b).map(|c| (c + 1.0) / 2.0),
                _ => None,
            };
            effects.movements.push(MovementEvidence {
                from_camera: candidate.from_camera.clone(),
                to_camera: event.camera_id.clone(),
                gap_ms: gap_ms as u64,
                confidence: object.score * visual.unwrap_or(0.8),
                at: event.timestamp,
            });
        }
    }

    fn open_departures(
        &self,
        state: &mut EngineState,
        topology: &Topology,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) {
        let grace_ms = self.settings.presence_grace_ms as i64;
        let departed: Vec<Uuid> = state
            .registry
            .active()
            .filter(|o| {
                o.state == ObjectState::Detected
                    && o.idle_ms(now) >= grace_ms
                    && !state.candidates.contains(&o.global_id)
            })
            .map(|o| o.global_id)
            .collect();

        for global_id in departed {
            let Some(candidate) = state
                .registry
                .get(&global_id)
                .map(|o| OpenTransitCandidate::open(o, topology, &self.settings))
            else {
                continue;
            };
            let Some(tracked) = state.registry.get_mut(&global_id) else {
                continue;
            };
            tracked.state = ObjectState::InTransit;
            debug!(
                global_id = %global_id,
                from_camera = %candidate.from_camera,
                windows = candidate.windows.len(),
                "Transit opened"
            );
            effects
                .events
                .push(TrackingEvent::TransitStarted(TransitStartedMessage {
                    global_id,
                    from_camera: candidate.from_camera.clone(),
                    departure: candidate.departure,
                    window_count: candidate.windows.len(),
                }));
            state.candidates.insert(candidate);
        }
    }

    fn expire_candidates(&self, state: &mut EngineState, now: DateTime<Utc>, effects: &mut Effects) {
        for global_id in state.candidates.expired(now) {
            let Some(candidate) = state.candidates.remove(&global_id) else {
                continue;
            };
            let terminal = if candidate.boundary_origin {
                ObjectState::Exited
            } else {
                ObjectState::Lost
            };
            state.registry.finish(&global_id, terminal);
            let journey = state.registry.journey(&global_id).unwrap_or_default();
            let message = ObjectFinishedMessage {
                global_id,
                class_name: candidate.class_name.clone(),
                last_camera: candidate.from_camera.clone(),
                journey,
            };
            match terminal {
                ObjectState::Exited => {
                    state.stats.exited += 1;
                    info!(global_id = %global_id, camera_id = %candidate.from_camera, "Object exited");
                    effects.events.push(TrackingEvent::ObjectExited(message));
                }
                _ => {
                    state.stats.lost += 1;
                    info!(global_id = %global_id, camera_id = %candidate.from_camera, "Object lost");
                    effects.events.push(TrackingEvent::ObjectLost(message));
                }
            }
        }
    }

    async fn dispatch(&self, effects: Effects) {
        for event in effects.events {
            self.hub.publish(event);
        }
        for transit in effects.transits {
            if let Err(e) = self
                .learner
                .observe(&transit.connection_id, transit.observed_ms)
                .await
            {
                warn!(
                    connection_id = %transit.connection_id,
                    error = %e,
                    "Transit observation rejected"
                );
            }
        }
        for movement in effects.movements {
            if let Err(e) = self
                .suggestions
                .observe_movement(
                    &movement.from_camera,
                    &movement.to_camera,
                    movement.gap_ms,
                    movement.confidence,
                    movement.at,
                )
                .await
            {
                warn!(
                    from = %movement.from_camera,
                    to = %movement.to_camera,
                    error = %e,
                    "Movement evidence rejected"
                );
            }
        }
    }
}

struct ArrivalWin {
    global_id: Uuid,
    connection_id: String,
    from_camera: String,
    departure: DateTime<Utc>,
    confidence: f64,
}

fn labels_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
