//! Alert manager
//!
//! ## Responsibilities
//!
//! - Evaluate tracking events against host-configured alert rules
//! - Enforce a per-rule, per-object delivery cooldown
//! - Fan matched notifications out to registered sinks
//!
//! The manager is a hub subscriber running beside the engine; it never
//! sits on the detection path. Sink failures are logged and isolated, a
//! broken webhook cannot stall the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrackerSettings;
use crate::error::Result;
use crate::hub::{TrackingEvent, TrackingHub};

/// Event classes a rule can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Entry,
    Exit,
    Loitering,
}

/// Host-configured alert rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    /// Empty matches every camera
    #[serde(default)]
    pub cameras: Vec<String>,
    /// Empty matches every class
    #[serde(default)]
    pub classes: Vec<String>,
    /// Applied where the triggering event carries a detection score
    #[serde(default)]
    pub min_score: f64,
    #[serde(default)]
    pub on_entry: bool,
    #[serde(default)]
    pub on_exit: bool,
    #[serde(default)]
    pub on_loitering: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    fn watches(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::Entry => self.on_entry,
            AlertKind::Exit => self.on_exit,
            AlertKind::Loitering => self.on_loitering,
        }
    }

    fn covers(&self, camera_id: &str, class_name: &str, score: Option<f64>) -> bool {
        (self.cameras.is_empty() || self.cameras.iter().any(|c| c == camera_id))
            && (self.classes.is_empty() || self.classes.iter().any(|c| c == class_name))
            && score.map_or(true, |s| s >= self.min_score)
    }
}

/// One matched rule firing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub rule_id: String,
    pub kind: AlertKind,
    pub global_id: Uuid,
    pub camera_id: String,
    pub class_name: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Delivery target registered by the host
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &AlertNotification) -> Result<()>;
}

/// AlertManager instance
pub struct AlertManager {
    cooldown_ms: i64,
    hub: Arc<TrackingHub>,
    rules: RwLock<Vec<AlertRule>>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
    /// Last delivery per (rule, object)
    recent: Mutex<HashMap<(String, Uuid), DateTime<Utc>>>,
    running: RwLock<bool>,
    shutdown: Notify,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlertManager {
    pub fn new(hub: Arc<TrackingHub>, settings: &TrackerSettings) -> Self {
        Self {
            cooldown_ms: settings.object_alert_cooldown_ms as i64,
            hub,
            rules: RwLock::new(Vec::new()),
            sinks: RwLock::new(Vec::new()),
            recent: Mutex::new(HashMap::new()),
            running: RwLock::new(false),
            shutdown: Notify::new(),
            worker: Mutex::new(None),
        }
    }

    pub async fn set_rules(&self, rules: Vec<AlertRule>) {
        info!(rules = rules.len(), "Alert rules replaced");
        *self.rules.write().await = rules;
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.clone()
    }

    pub async fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Subscribe to the hub and start evaluating events.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Alert manager already running");
                return;
            }
            *running = true;
        }

        let mut events = self.hub.subscribe();
        let manager = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => manager.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Alert stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = manager.shutdown.notified() => break,
                }
            }
            debug!("Alert manager loop exited");
        });
        *self.worker.lock().await = Some(handle);
        info!("Alert manager started");
    }

    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }
        self.shutdown.notify_one();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Alert worker join failed");
            }
        }
        info!("Alert manager stopped");
    }

    /// Evaluate one event. Called by the worker loop; public so hosts
    /// without a runtime loop can push events through directly.
    pub async fn handle_event(&self, event: TrackingEvent) {
        let (kind, global_id, camera_id, class_name, score, detail) = match event {
            TrackingEvent::ObjectEntered(m) => (
                AlertKind::Entry,
                m.global_id,
                m.camera_id.clone(),
                m.class_name.clone(),
                Some(m.score),
                format!("{} entered at {}", m.class_name, m.camera_id),
            ),
            TrackingEvent::ObjectExited(m) => (
                AlertKind::Exit,
                m.global_id,
                m.last_camera.clone(),
                m.class_name.clone(),
                None,
                format!("{} left the property at {}", m.class_name, m.last_camera),
            ),
            TrackingEvent::LoiteringAlert(m) => (
                AlertKind::Loitering,
                m.global_id,
                m.camera_id.clone(),
                m.class_name.clone(),
                None,
                format!(
                    "{} loitering at {} for {}s",
                    m.class_name,
                    m.camera_id,
                    m.dwell_ms / 1_000
                ),
            ),
            _ => return,
        };

        let matched: Vec<String> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.enabled && r.watches(kind) && r.covers(&camera_id, &class_name, score))
            .map(|r| r.id.clone())
            .collect();
        if matched.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut due = Vec::new();
        {
            let mut recent = self.recent.lock().await;
            for rule_id in matched {
                let key = (rule_id.clone(), global_id);
                let cooled = recent
                    .get(&key)
                    .map_or(true, |last| (now - *last).num_milliseconds() >= self.cooldown_ms);
                if cooled {
                    recent.insert(key, now);
                    due.push(rule_id);
                } else {
                    debug!(rule_id = %rule_id, global_id = %global_id, "Alert suppressed by cooldown");
                }
            }
            if recent.len() > 1_024 {
                let cutoff = self.cooldown_ms;
                recent.retain(|_, last| (now - *last).num_milliseconds() < cutoff);
            }
        }

        for rule_id in due {
            let notification = AlertNotification {
                rule_id,
                kind,
                global_id,
                camera_id: camera_id.clone(),
                class_name: class_name.clone(),
                detail: detail.clone(),
                at: now,
            };
            self.dispatch(&notification).await;
        }
    }

    async fn dispatch(&self, notification: &AlertNotification) {
        let sinks = self.sinks.read().await.clone();
        info!(
            rule_id = %notification.rule_id,
            kind = ?notification.kind,
            camera_id = %notification.camera_id,
            sinks = sinks.len(),
            "Dispatching alert"
        );
        let deliveries = sinks
            .iter()
            .map(|sink| async move { (sink.name().to_string(), sink.deliver(notification).await) });
        for (name, outcome) in join_all(deliveries).await {
            if let Err(e) = outcome {
                warn!(sink = %name, error = %e, "Alert sink failed");
            }
        }
    }
}
