//! TrackingHub - In-Process Event Distribution
//!
//! ## Responsibilities
//!
//! - Broadcast engine events (lifecycle, matches, alerts) to subscribers
//! - Broadcast topology/suggestion/training notifications
//!
//! Subscribers are in-process observers: the host's UI bridge, the alert
//! manager, tests. Delivery is fire-and-forget; a hub with no subscribers
//! drops events silently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Hub event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum TrackingEvent {
    ObjectDetected(ObjectDetectedMessage),
    TransitStarted(TransitStartedMessage),
    ObjectMatched(ObjectMatchedMessage),
    ObjectLost(ObjectFinishedMessage),
    ObjectExited(ObjectFinishedMessage),
    /// First sighting on a boundary camera
    ObjectEntered(ObjectDetectedMessage),
    LoiteringAlert(LoiteringAlertMessage),
    SuggestionRecorded(SuggestionMessage),
    SuggestionResolved(SuggestionResolvedMessage),
    TopologyChanged(TopologyChangedMessage),
    TrainingStatusChanged(TrainingStatusMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDetectedMessage {
    pub global_id: Uuid,
    pub camera_id: String,
    pub class_name: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitStartedMessage {
    pub global_id: Uuid,
    pub from_camera: String,
    pub departure: DateTime<Utc>,
    /// Arrival windows opened for this departure
    pub window_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMatchedMessage {
    pub global_id: Uuid,
    pub from_camera: String,
    pub to_camera: String,
    pub connection_id: String,
    pub confidence: f64,
    pub transit_ms: i64,
    pub journey: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFinishedMessage {
    pub global_id: Uuid,
    pub class_name: String,
    pub last_camera: String,
    pub journey: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoiteringAlertMessage {
    pub global_id: Uuid,
    pub camera_id: String,
    pub class_name: String,
    pub dwell_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionMessage {
    pub suggestion_id: Uuid,
    pub kind: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionResolvedMessage {
    pub suggestion_id: Uuid,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyChangedMessage {
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatusMessage {
    pub session_id: Uuid,
    pub status: String,
}

/// TrackingHub instance
pub struct TrackingHub {
    sender: broadcast::Sender<TrackingEvent>,
}

impl TrackingHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: TrackingEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Hub event delivered"),
            Err(_) => debug!("Hub event dropped (no subscribers)"),
        }
    }
}

impl Default for TrackingHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let hub = TrackingHub::new(8);
        let mut rx = hub.subscribe();

        hub.publish(TrackingEvent::TopologyChanged(TopologyChangedMessage {
            revision: 3,
        }));

        match rx.recv().await.unwrap() {
            TrackingEvent::TopologyChanged(msg) => assert_eq!(msg.revision, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TrackingEvent::LoiteringAlert(LoiteringAlertMessage {
            global_id: Uuid::new_v4(),
            camera_id: "porch".to_string(),
            class_name: "person".to_string(),
            dwell_ms: 310_000,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"loitering_alert\""));
        assert!(json.contains("\"dwell_ms\":310000"));
    }
}
