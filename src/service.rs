//! CoreService - In-Process API Facade
//!
//! ## Responsibilities
//!
//! - Wire the topology repository, correlation engine, learner,
//!   suggestion store, training service, discovery worker and alert
//!   manager into one composition root
//! - Expose the operations the host's transport layer calls
//! - Keep engine restarts atomic around topology replacement
//!
//! The facade owns nothing the host cares about persisting: storage comes
//! in through `TopologyStore`, vision and language come in through the
//! discovery capability traits, alert delivery goes out through
//! `AlertSink`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{AlertManager, AlertRule, AlertSink};
use crate::config::{DiscoverySettings, InferenceSettings, TrackerSettings};
use crate::correlation::{CorrelationEngine, EngineStats};
use crate::discovery::{DescriptionGenerator, DiscoveryService, SceneAnalyzer};
use crate::error::{Error, Result};
use crate::hub::{TrackingEvent, TrackingHub};
use crate::learning::{Suggestion, SuggestionStore, TransitTimeLearner};
use crate::models::DetectionEvent;
use crate::topology::{
    infer_relationships, Connection, Topology, TopologyService, TopologyStore, TopologyUpdate,
};
use crate::tracking::LiveTrackingState;
use crate::training::{
    TrainingApplyResult, TrainingConfig, TrainingLandmarkMark, TrainingService, TrainingStatus,
};

/// Settings bundle for the whole core
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub tracker: TrackerSettings,
    pub discovery: DiscoverySettings,
    pub inference: InferenceSettings,
}

/// CoreService instance
pub struct CoreService {
    inference_settings: InferenceSettings,
    topology: Arc<TopologyService>,
    hub: Arc<TrackingHub>,
    suggestions: Arc<SuggestionStore>,
    engine: Arc<CorrelationEngine>,
    training: Arc<TrainingService>,
    discovery: Arc<DiscoveryService>,
    alerts: Arc<AlertManager>,
}

impl CoreService {
    pub fn new(config: CoreConfig, store: Arc<dyn TopologyStore>) -> Self {
        Self::with_capabilities(config, store, None, None)
    }

    /// Full wiring, with the optional vision/language collaborators.
    pub fn with_capabilities(
        config: CoreConfig,
        store: Arc<dyn TopologyStore>,
        analyzer: Option<Arc<dyn SceneAnalyzer>>,
        generator: Option<Arc<dyn DescriptionGenerator>>,
    ) -> Self {
        let topology = Arc::new(TopologyService::new(store));
        let hub = Arc::new(TrackingHub::default());
        let learner = Arc::new(TransitTimeLearner::new(topology.clone(), &config.tracker));
        let suggestions = Arc::new(SuggestionStore::new(
            topology.clone(),
            hub.clone(),
            &config.tracker,
        ));
        let engine = Arc::new(CorrelationEngine::new(
            &config.tracker,
            topology.clone(),
            learner.clone(),
            suggestions.clone(),
            hub.clone(),
        ));
        let training = Arc::new(TrainingService::new(
            topology.clone(),
            learner,
            hub.clone(),
            &config.tracker,
        ));
        let discovery = Arc::new(DiscoveryService::new(
            topology.clone(),
            suggestions.clone(),
            analyzer,
            generator,
            &config.discovery,
        ));
        let alerts = Arc::new(AlertManager::new(hub.clone(), &config.tracker));

        Self {
            inference_settings: config.inference,
            topology,
            hub,
            suggestions,
            engine,
            training,
            discovery,
            alerts,
        }
    }

    /// Adopt the stored topology (when one exists and validates) and start
    /// the engine and alert loops.
    pub async fn start(&self) -> Result<()> {
        if let Err(e) = self.topology.load().await {
            warn!(error = %e, "Stored topology not adopted, starting empty");
        }
        self.engine.clone().start().await;
        self.alerts.clone().start().await;
        info!("Core service started");
        Ok(())
    }

    /// Stop both loops. Every outstanding deadline dies with the engine
    /// loop; tracked state is retained for a later start.
    pub async fn stop(&self) {
        self.engine.stop().await;
        self.alerts.stop().await;
        info!("Core service stopped");
    }

    // --- detection intake ---------------------------------------------

    /// Route one detection batch to live correlation and, when a walk is
    /// being recorded, to the training visit log. Both consume the same
    /// stream; only the bookkeeping differs.
    pub async fn submit_detections(&self, event: DetectionEvent) -> Result<()> {
        self.training.record_event(&event).await;
        self.engine.submit(event).await
    }

    // --- topology ------------------------------------------------------

    pub async fn topology(&self) -> Arc<Topology> {
        self.topology.get().await
    }

    /// Replace the whole topology document. The engine is stopped before
    /// the swap and restarted after it, so no event is ever correlated
    /// half against the old graph and half against the new one. A
    /// validation failure leaves the previous document live and restarts
    /// the engine over it.
    pub async fn update_topology(&self, topology: Topology) -> Result<u64> {
        let was_running = self.engine.is_running().await;
        if was_running {
            self.engine.stop().await;
        }
        let result = self.topology.replace(topology).await;
        if was_running {
            self.engine.clone().start().await;
        }
        let revision = result?;
        self.hub.publish(TrackingEvent::TopologyChanged(
            crate::hub::TopologyChangedMessage { revision },
        ));
        Ok(revision)
    }

    /// Change notifications; the storage collaborator and the UI bridge
    /// subscribe here instead of registering raw callbacks.
    pub fn subscribe_topology(&self) -> broadcast::Receiver<TopologyUpdate> {
        self.topology.subscribe()
    }

    /// Candidate connections from floor-plan geometry alone. Pure: the
    /// caller decides what to do with the proposals.
    pub async fn infer_relationships(&self) -> Vec<Connection> {
        infer_relationships(&*self.topology.get().await, &self.inference_settings)
    }

    // --- tracking queries ---------------------------------------------

    pub async fn live_tracking_state(&self) -> LiveTrackingState {
        self.engine.live_state(Utc::now()).await
    }

    pub async fn journey_path(&self, global_id: Uuid) -> Result<Vec<String>> {
        self.engine
            .journey(&global_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("tracked object {global_id}")))
    }

    pub async fn engine_stats(&self) -> EngineStats {
        self.engine.stats().await
    }

    // --- suggestions ---------------------------------------------------

    pub async fn pending_landmark_suggestions(&self) -> Vec<Suggestion> {
        self.suggestions.pending_landmark_suggestions().await
    }

    pub async fn connection_suggestions(&self) -> Vec<Suggestion> {
        self.suggestions.connection_suggestions().await
    }

    pub async fn accept_suggestion(&self, id: Uuid) -> Result<Suggestion> {
        self.suggestions.accept(id).await
    }

    pub async fn reject_suggestion(&self, id: Uuid) -> Result<Suggestion> {
        self.suggestions.reject(id).await
    }

    // --- training ------------------------------------------------------

    pub async fn start_training_session(
        &self,
        trainer_name: Option<String>,
        config: Option<TrainingConfig>,
    ) -> Result<TrainingStatus> {
        self.training.start(trainer_name, config, Utc::now()).await
    }

    pub async fn pause_training_session(&self) -> Result<TrainingStatus> {
        self.training.pause().await
    }

    pub async fn resume_training_session(&self) -> Result<TrainingStatus> {
        self.training.resume().await
    }

    pub async fn end_training_session(&self) -> Result<TrainingStatus> {
        self.training.end(Utc::now()).await
    }

    pub async fn mark_training_landmark(
        &self,
        mark: TrainingLandmarkMark,
    ) -> Result<TrainingStatus> {
        self.training.mark_landmark(mark).await
    }

    pub async fn training_status(&self) -> TrainingStatus {
        self.training.status().await
    }

    pub async fn apply_training_to_topology(&self) -> Result<TrainingApplyResult> {
        self.training.apply_to_topology().await
    }

    pub async fn reset_training_session(&self) -> TrainingStatus {
        self.training.reset().await
    }

    // --- discovery -----------------------------------------------------

    /// Run scene analysis for one camera, off the detection path. The
    /// worker applies its own debounce, concurrency bound and timeout.
    pub async fn analyze_camera(&self, camera_key: &str) -> Result<usize> {
        self.discovery.analyze_camera(camera_key).await
    }

    // --- alerts & events ----------------------------------------------

    pub async fn set_alert_rules(&self, rules: Vec<AlertRule>) {
        self.alerts.set_rules(rules).await;
    }

    pub async fn add_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        self.alerts.add_sink(sink).await;
    }

    /// Raw engine/topology/training event stream for in-process observers.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.hub.subscribe()
    }

    /// Direct engine access for hosts that drive time themselves
    /// (replays, deterministic tests).
    pub fn engine(&self) -> Arc<CorrelationEngine> {
        self.engine.clone()
    }
}
