//! Scene discovery worker
//!
//! ## Responsibilities
//!
//! - Drive the host's scene analyzer against cameras, bounded and debounced
//! - Enrich observations through the description generator with a timeout
//! - Feed surviving observations into the suggestion store
//!
//! Analysis never runs on the detection path: callers spawn it. A camera
//! is re-analyzed at most once per debounce interval regardless of how
//! often detections arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::DiscoverySettings;
use crate::error::{Error, Result};
use crate::learning::SuggestionStore;
use crate::topology::{Camera, TopologyService};

use super::types::DiscoveryObservation;

/// Vision collaborator: looks at a camera's scene and reports features.
/// Implementations own snapshot access and model inference.
#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    async fn analyze(&self, camera: &Camera) -> Result<Vec<DiscoveryObservation>>;
}

/// Language collaborator: turns an observation into a readable description.
#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn describe(&self, observation: &DiscoveryObservation) -> Result<String>;
}

/// DiscoveryService instance
pub struct DiscoveryService {
    settings: DiscoverySettings,
    topology: Arc<TopologyService>,
    suggestions: Arc<SuggestionStore>,
    analyzer: Option<Arc<dyn SceneAnalyzer>>,
    generator: Option<Arc<dyn DescriptionGenerator>>,
    limiter: Arc<Semaphore>,
    last_run: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl DiscoveryService {
    pub fn new(
        topology: Arc<TopologyService>,
        suggestions: Arc<SuggestionStore>,
        analyzer: Option<Arc<dyn SceneAnalyzer>>,
        generator: Option<Arc<dyn DescriptionGenerator>>,
        settings: &DiscoverySettings,
    ) -> Self {
        Self {
            settings: settings.clone(),
            topology,
            suggestions,
            analyzer,
            generator,
            limiter: Arc::new(Semaphore::new(settings.max_concurrent_analysis.max(1))),
            last_run: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Analyze one camera's scene, debounced per camera. Returns how many
    /// suggestions were recorded.
    pub async fn analyze_camera(&self, camera_key: &str) -> Result<usize> {
        let Some(analyzer) = self.analyzer.clone() else {
            return Ok(0);
        };

        let now = Utc::now();
        {
            // stamping before the run also blocks concurrent duplicates
            let mut last_run = self.last_run.write().await;
            if let Some(previous) = last_run.get(camera_key) {
                let elapsed = (now - *previous).num_milliseconds();
                if elapsed < self.settings.llm_debounce_interval_ms as i64 {
                    debug!(camera = camera_key, elapsed_ms = elapsed, "Analysis debounced");
                    return Ok(0);
                }
            }
            last_run.insert(camera_key.to_string(), now);
        }

        let topology = self.topology.get().await;
        let camera = topology
            .resolve_camera(camera_key)
            .ok_or_else(|| Error::NotFound(format!("camera {camera_key}")))?
            .clone();

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("analysis limiter closed: {e}")))?;

        let budget = Duration::from_millis(self.settings.llm_fallback_timeout_ms);
        let observations = match timeout(budget, analyzer.analyze(&camera)).await {
            Ok(Ok(observations)) => observations,
            Ok(Err(e)) => {
                warn!(camera = %camera.id, error = %e, "Scene analysis failed");
                return Ok(0);
            }
            Err(_) => {
                warn!(camera = %camera.id, "Scene analysis timed out");
                return Ok(0);
            }
        };
        debug!(
            camera = %camera.id,
            observations = observations.len(),
            "Scene analysis complete"
        );

        let mut recorded = 0;
        for mut observation in observations {
            observation.camera = camera.id.clone();
            if !self.enrich(&mut observation, budget).await {
                continue;
            }
            if self
                .suggestions
                .record_discovery(&observation, Utc::now())
                .await?
                .is_some()
            {
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Run the description generator over one observation. Returns false
    /// when the observation should be dropped.
    async fn enrich(&self, observation: &mut DiscoveryObservation, budget: Duration) -> bool {
        let Some(generator) = &self.generator else {
            return true;
        };
        match timeout(budget, generator.describe(observation)).await {
            Ok(Ok(text)) => {
                observation.description = Some(text);
                true
            }
            Ok(Err(e)) => self.degrade(observation, &format!("generator failed: {e}")),
            Err(_) => self.degrade(observation, "generator timed out"),
        }
    }

    fn degrade(&self, observation: &DiscoveryObservation, reason: &str) -> bool {
        if self.settings.llm_fallback_enabled {
            warn!(
                camera = %observation.camera,
                name = %observation.name,
                reason,
                "Using basic description"
            );
            true
        } else {
            warn!(
                camera = %observation.camera,
                name = %observation.name,
                reason,
                "Observation dropped (fallback disabled)"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerSettings;
    use crate::discovery::DiscoveryKind;
    use crate::hub::TrackingHub;
    use crate::topology::{LandmarkKind, MemoryTopologyStore, Topology};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SceneAnalyzer for FixedAnalyzer {
        async fn analyze(&self, camera: &Camera) -> Result<Vec<DiscoveryObservation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![DiscoveryObservation {
                camera: camera.name.clone(),
                kind: DiscoveryKind::Landmark,
                name: "Mailbox".to_string(),
                landmark_kind: Some(LandmarkKind::Mailbox),
                zone_kind: None,
                confidence: 0.7,
                bounding_box: None,
                distance_feet: Some(12.0),
                description: None,
            }])
        }
    }

    struct StalledGenerator;

    #[async_trait]
    impl DescriptionGenerator for StalledGenerator {
        async fn describe(&self, _observation: &DiscoveryObservation) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("unreachable".to_string())
        }
    }

    async fn harness(
        generator: Option<Arc<dyn DescriptionGenerator>>,
        settings: DiscoverySettings,
    ) -> (DiscoveryService, Arc<SuggestionStore>, Arc<FixedAnalyzer>) {
        let topology = Arc::new(TopologyService::new(Arc::new(MemoryTopologyStore::new())));
        topology
            .replace(Topology {
                cameras: vec![Camera {
                    id: "front".to_string(),
                    name: "Front Door".to_string(),
                    position: None,
                    field_of_view: None,
                    boundary: false,
                }],
                ..Topology::default()
            })
            .await
            .unwrap();
        let suggestions = Arc::new(SuggestionStore::new(
            topology.clone(),
            Arc::new(TrackingHub::new(16)),
            &TrackerSettings::default(),
        ));
        let analyzer = Arc::new(FixedAnalyzer {
            calls: AtomicUsize::new(0),
        });
        let service = DiscoveryService::new(
            topology,
            suggestions.clone(),
            Some(analyzer.clone()),
            generator,
            &settings,
        );
        (service, suggestions, analyzer)
    }

    #[tokio::test]
    async fn analysis_records_suggestions_and_debounces() {
        let (service, suggestions, analyzer) =
            harness(None, DiscoverySettings::default()).await;

        assert_eq!(service.analyze_camera("front").await.unwrap(), 1);
        assert_eq!(suggestions.pending_landmark_suggestions().await.len(), 1);

        // immediate re-run is debounced: analyzer not called again
        assert_eq!(service.analyze_camera("front").await.unwrap(), 0);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_generator_degrades_to_basic_path() {
        let (service, suggestions, _) = harness(
            Some(Arc::new(StalledGenerator)),
            DiscoverySettings {
                llm_fallback_timeout_ms: 100,
                ..DiscoverySettings::default()
            },
        )
        .await;

        assert_eq!(service.analyze_camera("front").await.unwrap(), 1);
        let pending = suggestions.pending_landmark_suggestions().await;
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_disabled_drops_unenriched_observations() {
        let (service, suggestions, _) = harness(
            Some(Arc::new(StalledGenerator)),
            DiscoverySettings {
                llm_fallback_timeout_ms: 100,
                llm_fallback_enabled: false,
                ..DiscoverySettings::default()
            },
        )
        .await;

        assert_eq!(service.analyze_camera("front").await.unwrap(), 0);
        assert!(suggestions.pending_landmark_suggestions().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_camera_is_an_error() {
        let (service, _, _) = harness(None, DiscoverySettings::default()).await;
        assert!(matches!(
            service.analyze_camera("garage").await,
            Err(Error::NotFound(_))
        ));
    }
}
