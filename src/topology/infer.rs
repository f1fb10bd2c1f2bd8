//! Spatial relationship inference
//!
//! Pure geometry over the floor plan: no IO, no clock, no randomness.
//! Proposes connections between camera pairs that are close enough to walk
//! between and whose view cones face each other, seeding transit times
//! from walking speed.

use tracing::debug;

use crate::config::InferenceSettings;

use super::types::{Camera, Connection, Topology, TransitRange};

/// Compass bearing from `a` to `b` in degrees (0 = plan-up, clockwise).
fn bearing_deg(a: &Camera, b: &Camera) -> Option<f64> {
    let (pa, pb) = (a.position?, b.position?);
    let deg = (pb.x - pa.x).atan2(-(pb.y - pa.y)).to_degrees();
    Some(deg.rem_euclid(360.0))
}

fn angular_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Whether `camera` plausibly sees along the given bearing. Cameras
/// without a configured FOV are treated as omnidirectional so proximity
/// alone can still link them.
fn faces(camera: &Camera, bearing: f64, tolerance_deg: f64) -> bool {
    match camera.field_of_view {
        Some(fov) => angular_diff(bearing, fov.direction) <= fov.angle / 2.0 + tolerance_deg,
        None => true,
    }
}

/// Propose connections for unlinked camera pairs.
///
/// A pair qualifies when both cameras have floor positions, the distance
/// between them is within the proximity bound, and each camera faces the
/// other. Typical transit time is distance over walking speed; the window
/// spans half to double that. Returned connections are not applied here;
/// the caller decides what to merge.
pub fn infer_relationships(topology: &Topology, settings: &InferenceSettings) -> Vec<Connection> {
    let mut proposed = Vec::new();

    for (i, a) in topology.cameras.iter().enumerate() {
        for b in topology.cameras.iter().skip(i + 1) {
            if topology.find_connection(&a.id, &b.id).is_some()
                || topology.find_connection(&b.id, &a.id).is_some()
            {
                continue;
            }
            let (Some(pa), Some(pb)) = (a.position, b.position) else {
                continue;
            };

            let feet = pa.distance_to(&pb) / topology.floor_plan_scale;
            if feet > settings.proximity_feet {
                continue;
            }

            let Some(bearing_ab) = bearing_deg(a, b) else {
                continue;
            };
            let bearing_ba = (bearing_ab + 180.0).rem_euclid(360.0);
            if !faces(a, bearing_ab, settings.facing_tolerance_deg)
                || !faces(b, bearing_ba, settings.facing_tolerance_deg)
            {
                continue;
            }

            let typical_ms = ((feet / settings.walking_speed_fps) * 1000.0).round() as u64;
            debug!(
                from = %a.id,
                to = %b.id,
                distance_feet = feet,
                typical_ms,
                "Inferred camera relationship"
            );
            proposed.push(Connection {
                id: format!("conn-{}-{}", a.id, b.id),
                from_camera: a.id.clone(),
                to_camera: b.id.clone(),
                bidirectional: true,
                transit_time: TransitRange::around_typical(typical_ms.max(1_000)),
                entry_zone: None,
                exit_zone: None,
            });
        }
    }

    proposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{FieldOfView, FloorPosition};

    fn cam(id: &str, x: f64, y: f64, direction: Option<f64>) -> Camera {
        Camera {
            id: id.to_string(),
            name: id.to_string(),
            position: Some(FloorPosition { x, y }),
            field_of_view: direction.map(|direction| FieldOfView {
                direction,
                angle: 90.0,
                range: 50.0,
            }),
            boundary: false,
        }
    }

    fn plan(cameras: Vec<Camera>) -> Topology {
        Topology {
            cameras,
            floor_plan_scale: 2.0,
            ..Topology::default()
        }
    }

    #[test]
    fn facing_pair_gets_walking_speed_window() {
        // 80px apart at 2px/ft = 40ft, looking straight at each other
        let topology = plan(vec![
            cam("a", 0.0, 0.0, Some(90.0)),
            cam("b", 80.0, 0.0, Some(270.0)),
        ]);
        let proposed = infer_relationships(&topology, &InferenceSettings::default());
        assert_eq!(proposed.len(), 1);
        let conn = &proposed[0];
        assert!(conn.bidirectional);
        // 40ft at 4ft/s = 10s typical, half to double window
        assert_eq!(conn.transit_time.typical, 10_000);
        assert_eq!(conn.transit_time.min, 5_000);
        assert_eq!(conn.transit_time.max, 20_000);
    }

    #[test]
    fn distant_or_averted_pairs_are_skipped() {
        let too_far = plan(vec![
            cam("a", 0.0, 0.0, Some(90.0)),
            cam("b", 400.0, 0.0, Some(270.0)),
        ]);
        assert!(infer_relationships(&too_far, &InferenceSettings::default()).is_empty());

        // b looks away from a
        let averted = plan(vec![
            cam("a", 0.0, 0.0, Some(90.0)),
            cam("b", 80.0, 0.0, Some(90.0)),
        ]);
        assert!(infer_relationships(&averted, &InferenceSettings::default()).is_empty());
    }

    #[test]
    fn missing_fov_counts_as_omnidirectional() {
        let topology = plan(vec![cam("a", 0.0, 0.0, None), cam("b", 60.0, 0.0, None)]);
        assert_eq!(
            infer_relationships(&topology, &InferenceSettings::default()).len(),
            1
        );
    }

    #[test]
    fn existing_edges_are_not_duplicated() {
        let mut topology = plan(vec![
            cam("a", 0.0, 0.0, Some(90.0)),
            cam("b", 80.0, 0.0, Some(270.0)),
        ]);
        topology.connections = infer_relationships(&topology, &InferenceSettings::default());
        assert!(infer_relationships(&topology, &InferenceSettings::default()).is_empty());
    }
}
