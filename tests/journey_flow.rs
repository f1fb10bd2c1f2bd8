//! End-to-end flows over the `CoreService` facade: cross-camera journeys,
//! suggestion lifecycles, guided training walks, discovery intake and
//! alert delivery, all driven with synthetic detection streams.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use camtrail::alerts::{AlertNotification, AlertRule, AlertSink};
use camtrail::discovery::{DiscoveryKind, DiscoveryObservation, SceneAnalyzer};
use camtrail::learning::SuggestionPayload;
use camtrail::models::{DetectedObject, DetectionEvent};
use camtrail::topology::{
    Camera, Connection, FieldOfView, FloorPosition, LandmarkKind, MemoryTopologyStore, Topology,
    TransitRange,
};
use camtrail::training::{TrainingLandmarkMark, TrainingState};
use camtrail::{CoreConfig, CoreService, Error, Result};

fn cam(id: &str, boundary: bool) -> Camera {
    Camera {
        id: id.to_string(),
        name: id.to_uppercase(),
        position: None,
        field_of_view: None,
        boundary,
    }
}

fn conn(id: &str, from: &str, to: &str) -> Connection {
    Connection {
        id: id.to_string(),
        from_camera: from.to_string(),
        to_camera: to.to_string(),
        bidirectional: true,
        transit_time: TransitRange {
            min: 5_000,
            typical: 10_000,
            max: 20_000,
        },
        entry_zone: None,
        exit_zone: None,
    }
}

fn person(score: f64) -> DetectedObject {
    DetectedObject {
        class_name: "person".to_string(),
        label: None,
        score,
        bounding_box: None,
        embedding: None,
    }
}

fn named(label: &str) -> DetectedObject {
    DetectedObject {
        label: Some(label.to_string()),
        ..person(0.9)
    }
}

fn event_at(camera: &str, at: DateTime<Utc>, objects: Vec<DetectedObject>) -> DetectionEvent {
    DetectionEvent {
        camera_id: camera.to_string(),
        timestamp: at,
        objects,
    }
}

fn epoch(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
}

fn service() -> CoreService {
    CoreService::new(CoreConfig::default(), Arc::new(MemoryTopologyStore::new()))
}

#[tokio::test]
async fn journey_across_three_cameras() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![cam("a", false), cam("b", false), cam("c", false)],
        connections: vec![conn("ab", "a", "b"), conn("bc", "b", "c")],
        ..Topology::default()
    })
    .await
    .unwrap();

    // drive the engine with explicit timestamps instead of the loop
    let engine = core.engine();
    engine
        .process_event(event_at("a", epoch(0), vec![person(0.9)]))
        .await;
    engine.sweep(epoch(6_000)).await;
    engine
        .process_event(event_at("b", epoch(10_000), vec![person(0.9)]))
        .await;
    engine.sweep(epoch(16_000)).await;
    engine
        .process_event(event_at("c", epoch(20_000), vec![person(0.9)]))
        .await;

    let stats = core.engine_stats().await;
    assert_eq!(stats.objects_created, 1);
    assert_eq!(stats.matches, 2);

    let state = engine.live_state(epoch(20_000)).await;
    assert_eq!(state.objects.len(), 1);
    assert_eq!(state.objects[0].journey, vec!["a", "b", "c"]);

    let journey = core.journey_path(state.objects[0].global_id).await.unwrap();
    assert_eq!(journey, vec!["a", "b", "c"]);

    assert!(matches!(
        core.journey_path(uuid::Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));

    // both hops were observed at typical time, so typical is unchanged
    let topology = core.topology().await;
    assert_eq!(topology.connections[0].transit_time.typical, 10_000);
}

#[tokio::test]
async fn invalid_topology_keeps_last_valid_and_engine_running() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![cam("a", false), cam("b", false)],
        connections: vec![conn("ab", "a", "b")],
        ..Topology::default()
    })
    .await
    .unwrap();

    core.start().await.unwrap();
    core.submit_detections(event_at("a", Utc::now(), vec![person(0.9)]))
        .await
        .unwrap();

    let broken = Topology {
        cameras: vec![cam("a", false)],
        connections: vec![conn("ab", "a", "ghost")],
        ..Topology::default()
    };
    assert!(matches!(
        core.update_topology(broken).await,
        Err(Error::Validation(_))
    ));

    // previous document still live, engine restarted and accepting events
    assert_eq!(core.topology().await.cameras.len(), 2);
    assert!(core.engine().is_running().await);
    core.submit_detections(event_at("b", Utc::now(), vec![person(0.9)]))
        .await
        .unwrap();

    core.stop().await;
    assert!(core
        .submit_detections(event_at("a", Utc::now(), vec![person(0.9)]))
        .await
        .is_err());
}

#[tokio::test]
async fn unexplained_movement_becomes_an_acceptable_connection() {
    let core = service();
    // two cameras, deliberately unlinked
    core.update_topology(Topology {
        cameras: vec![cam("a", false), cam("b", false)],
        ..Topology::default()
    })
    .await
    .unwrap();

    let engine = core.engine();
    // two different people make the same unmapped walk
    engine
        .process_event(event_at("a", epoch(0), vec![named("alice")]))
        .await;
    engine.sweep(epoch(6_000)).await;
    engine
        .process_event(event_at("b", epoch(10_000), vec![named("alice")]))
        .await;
    assert!(core.connection_suggestions().await.is_empty());

    engine
        .process_event(event_at("a", epoch(30_000), vec![named("bob")]))
        .await;
    engine.sweep(epoch(36_000)).await;
    engine
        .process_event(event_at("b", epoch(42_000), vec![named("bob")]))
        .await;

    let pending = core.connection_suggestions().await;
    assert_eq!(pending.len(), 1);
    match &pending[0].payload {
        SuggestionPayload::Connection {
            from_camera,
            to_camera,
            ..
        } => {
            assert_eq!(from_camera, "a");
            assert_eq!(to_camera, "b");
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let id = pending[0].id;
    core.accept_suggestion(id).await.unwrap();
    assert!(core.topology().await.find_connection("a", "b").is_some());

    // one-shot: the resolved id is gone for both verbs
    assert!(matches!(
        core.accept_suggestion(id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        core.reject_suggestion(id).await,
        Err(Error::NotFound(_))
    ));
    assert!(core.connection_suggestions().await.is_empty());
}

#[tokio::test]
async fn training_walkthrough_records_stats_and_merges() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![cam("a", false), cam("b", false), cam("c", false)],
        connections: vec![conn("ab", "a", "b")],
        ..Topology::default()
    })
    .await
    .unwrap();
    core.start().await.unwrap();

    let t0 = Utc::now() - Duration::seconds(120);
    let status = core
        .start_training_session(Some("walker".to_string()), None)
        .await
        .unwrap();
    assert_eq!(status.state, TrainingState::Active);

    // a second start while one is in progress is refused
    assert!(matches!(
        core.start_training_session(None, None).await,
        Err(Error::Conflict(_))
    ));

    // the walk: a (two sightings), b, c, then back on b at the same
    // instant c fires (an overlap signal)
    for (camera, offset_ms) in [("a", 0), ("a", 2_000), ("b", 10_000), ("c", 20_000)] {
        core.submit_detections(event_at(
            camera,
            t0 + Duration::milliseconds(offset_ms),
            vec![person(0.9)],
        ))
        .await
        .unwrap();
    }
    core.submit_detections(event_at(
        "b",
        t0 + Duration::milliseconds(20_000),
        vec![person(0.9)],
    ))
    .await
    .unwrap();

    core.mark_training_landmark(TrainingLandmarkMark {
        camera_id: "c".to_string(),
        name: "Pool".to_string(),
        landmark_kind: Some(LandmarkKind::Pool),
        zone_kind: None,
        bounding_box: None,
        distance_feet: Some(20.0),
        marked_at: t0 + Duration::milliseconds(21_000),
    })
    .await
    .unwrap();

    // pause gates recording without dropping state
    core.pause_training_session().await.unwrap();
    core.submit_detections(event_at(
        "a",
        t0 + Duration::milliseconds(30_000),
        vec![person(0.9)],
    ))
    .await
    .unwrap();
    core.resume_training_session().await.unwrap();

    let ended = core.end_training_session().await.unwrap();
    assert_eq!(ended.state, TrainingState::Completed);
    let stats = ended.stats.expect("final stats");
    assert_eq!(stats.cameras_visited, 3);
    assert_eq!(stats.transits_recorded, 3);
    assert_eq!(stats.landmarks_marked, 1);
    assert_eq!(stats.overlaps_detected, 1);
    assert!((stats.coverage_percentage - 100.0).abs() < 1e-9);
    assert!((0.0..=100.0).contains(&stats.coverage_percentage));

    // landmarks are only markable mid-walk
    assert!(matches!(
        core.mark_training_landmark(TrainingLandmarkMark {
            camera_id: "a".to_string(),
            name: "Late".to_string(),
            landmark_kind: None,
            zone_kind: None,
            bounding_box: None,
            distance_feet: None,
            marked_at: Utc::now(),
        })
        .await,
        Err(Error::InvalidState(_))
    ));

    let applied = core.apply_training_to_topology().await.unwrap();
    assert!(applied.success);
    // b->c and c->b collapse into one new edge; a->b refines the existing one
    assert_eq!(applied.connections_created, 1);
    assert_eq!(applied.connections_updated, 1);
    assert_eq!(applied.landmarks_added, 1);

    let topology = core.topology().await;
    assert!(topology.find_connection("b", "c").is_some());
    assert_eq!(topology.landmarks.len(), 1);
    assert_eq!(topology.landmarks[0].name, "Pool");
    // refined typical moved toward the observed 8s gap
    assert!(topology.connections[0].transit_time.typical < 10_000);

    core.stop().await;
}

#[tokio::test]
async fn training_apply_without_session_changes_nothing() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![cam("a", false), cam("b", false)],
        connections: vec![conn("ab", "a", "b")],
        ..Topology::default()
    })
    .await
    .unwrap();

    let before = serde_json::to_string(&*core.topology().await).unwrap();
    let result = core.apply_training_to_topology().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.connections_created, 0);
    assert_eq!(result.landmarks_added, 0);

    let after = serde_json::to_string(&*core.topology().await).unwrap();
    assert_eq!(before, after);
    assert_eq!(core.training_status().await.state, TrainingState::Idle);
}

struct MailboxAnalyzer;

#[async_trait]
impl SceneAnalyzer for MailboxAnalyzer {
    async fn analyze(&self, camera: &Camera) -> Result<Vec<DiscoveryObservation>> {
        Ok(vec![DiscoveryObservation {
            camera: camera.id.clone(),
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

#[tokio::test]
async fn discovery_analysis_feeds_landmark_suggestions() {
    let core = CoreService::with_capabilities(
        CoreConfig::default(),
        Arc::new(MemoryTopologyStore::new()),
        Some(Arc::new(MailboxAnalyzer)),
        None,
    );
    core.update_topology(Topology {
        cameras: vec![Camera {
            position: Some(FloorPosition { x: 200.0, y: 200.0 }),
            field_of_view: Some(FieldOfView {
                direction: 90.0,
                angle: 90.0,
                range: 40.0,
            }),
            ..cam("front", false)
        }],
        ..Topology::default()
    })
    .await
    .unwrap();

    assert_eq!(core.analyze_camera("front").await.unwrap(), 1);
    // debounced: an immediate re-run records nothing
    assert_eq!(core.analyze_camera("front").await.unwrap(), 0);

    let pending = core.pending_landmark_suggestions().await;
    assert_eq!(pending.len(), 1);
    assert!((pending[0].confidence - 0.7).abs() < 1e-9);

    core.accept_suggestion(pending[0].id).await.unwrap();
    let topology = core.topology().await;
    assert_eq!(topology.landmarks.len(), 1);
    assert!(topology.landmarks[0].ai_suggested);
    // projected along the FOV, so east of the camera
    assert!(topology.landmarks[0].position.x > 200.0);

    assert!(matches!(
        core.analyze_camera("nowhere").await,
        Err(Error::NotFound(_))
    ));
}

struct RecordingSink {
    deliveries: Mutex<Vec<AlertNotification>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, notification: &AlertNotification) -> Result<()> {
        self.deliveries.lock().await.push(notification.clone());
        Ok(())
    }
}

#[tokio::test]
async fn entry_on_boundary_camera_reaches_alert_sink() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![cam("gate", true), cam("b", false)],
        connections: vec![conn("gb", "gate", "b")],
        ..Topology::default()
    })
    .await
    .unwrap();

    let sink = Arc::new(RecordingSink {
        deliveries: Mutex::new(Vec::new()),
    });
    core.add_alert_sink(sink.clone()).await;
    core.set_alert_rules(vec![AlertRule {
        id: "gate-entry".to_string(),
        cameras: vec!["gate".to_string()],
        classes: Vec::new(),
        min_score: 0.5,
        on_entry: true,
        on_exit: false,
        on_loitering: false,
        enabled: true,
    }])
    .await;

    core.start().await.unwrap();
    core.submit_detections(event_at("gate", Utc::now(), vec![person(0.9)]))
        .await
        .unwrap();

    // engine loop and alert loop both run in the background
    let mut delivered = Vec::new();
    for _ in 0..40 {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        delivered = sink.deliveries.lock().await.clone();
        if !delivered.is_empty() {
            break;
        }
    }
    core.stop().await;

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].rule_id, "gate-entry");
    assert_eq!(delivered[0].camera_id, "gate");
}

#[tokio::test]
async fn inference_proposes_only_close_facing_pairs() {
    let core = service();
    core.update_topology(Topology {
        cameras: vec![
            Camera {
                position: Some(FloorPosition { x: 0.0, y: 0.0 }),
                field_of_view: Some(FieldOfView {
                    direction: 90.0,
                    angle: 90.0,
                    range: 60.0,
                }),
                ..cam("west", false)
            },
            Camera {
                position: Some(FloorPosition { x: 40.0, y: 0.0 }),
                field_of_view: Some(FieldOfView {
                    direction: 270.0,
                    angle: 90.0,
                    range: 60.0,
                }),
                ..cam("east", false)
            },
            // too far away for any pairing
            Camera {
                position: Some(FloorPosition { x: 5_000.0, y: 0.0 }),
                field_of_view: None,
                ..cam("far", false)
            },
        ],
        floor_plan_scale: 1.0,
        ..Topology::default()
    })
    .await
    .unwrap();

    let proposed = core.infer_relationships().await;
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].from_camera, "west");
    assert_eq!(proposed[0].to_camera, "east");
    assert!(proposed[0].bidirectional);
    // 40 feet at 4 ft/s -> 10s typical
    assert_eq!(proposed[0].transit_time.typical, 10_000);
    assert!(proposed[0].transit_time.is_ordered());

    // proposals are not applied implicitly
    assert!(core.topology().await.connections.is_empty());
}
