//! Floor-plan projection
//!
//! Deterministic placement of discovered features. The same observation
//! against the same topology always lands on the same spot: repeated
//! analysis runs must not scatter landmarks around the plan. Depth and
//! angle heuristics are approximations and the constants below are part
//! of the projection's observable behavior.

use crate::models::BoundingBox;
use crate::topology::{Camera, FloorPosition, PolygonPoint, Topology};

/// Slots for spreading features that lack a bounding box across the cone
pub const LANDMARK_SPREAD_SLOTS: usize = 5;
/// Vertex count along each arc of a projected zone wedge
pub const ZONE_ARC_SAMPLES: usize = 6;

const DEFAULT_DEPTH_FEET: f64 = 15.0;
const ZONE_DEPTH_MARGIN_FEET: f64 = 6.0;
const ZONE_MIN_INNER_FEET: f64 = 2.0;
const FALLBACK_SPAN_DEG: f64 = 30.0;
const MIN_SPAN_DEG: f64 = 10.0;

const GRID_ORIGIN_X: f64 = 100.0;
const GRID_ORIGIN_Y: f64 = 100.0;
const GRID_PITCH: f64 = 150.0;
const GRID_PER_ROW: usize = 3;
const FALLBACK_ZONE_HALF: f64 = 5.0;
const DEFAULT_PLAN_SIDE: f64 = 1000.0;

/// Fallback placement when a camera has no usable position or FOV.
pub fn grid_position(index: usize) -> FloorPosition {
    FloorPosition {
        x: GRID_ORIGIN_X + (index % GRID_PER_ROW) as f64 * GRID_PITCH,
        y: GRID_ORIGIN_Y + (index / GRID_PER_ROW) as f64 * GRID_PITCH,
    }
}

fn plan_size(topology: &Topology) -> (f64, f64) {
    topology
        .floor_plan_size
        .map(|s| (s.width, s.height))
        .unwrap_or((DEFAULT_PLAN_SIDE, DEFAULT_PLAN_SIDE))
}

fn normalize(topology: &Topology, position: FloorPosition) -> PolygonPoint {
    let (width, height) = plan_size(topology);
    PolygonPoint {
        x: (position.x / width * 100.0).clamp(0.0, 100.0),
        y: (position.y / height * 100.0).clamp(0.0, 100.0),
    }
}

/// Angular offset within the cone: the bbox horizontal center when the
/// analyzer saw where the feature sits, otherwise an index-modulo spread
/// so repeated unanchored features fan out deterministically.
fn angular_offset_deg(fov_angle: f64, bounding_box: Option<&BoundingBox>, index: usize) -> f64 {
    match bounding_box {
        Some(bbox) => (bbox.center_x() - 0.5) * fov_angle,
        None => {
            let slot = index % LANDMARK_SPREAD_SLOTS;
            ((slot as f64 + 0.5) / LANDMARK_SPREAD_SLOTS as f64 - 0.5) * fov_angle
        }
    }
}

fn depth_feet(camera: &Camera, distance_feet: Option<f64>) -> f64 {
    let mut depth = distance_feet
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(DEFAULT_DEPTH_FEET);
    if let Some(fov) = camera.field_of_view {
        if fov.range > 0.0 {
            depth = depth.min(fov.range);
        }
    }
    depth
}

fn project_along(camera_pos: FloorPosition, direction_deg: f64, distance_px: f64) -> FloorPosition {
    let rad = direction_deg.to_radians();
    FloorPosition {
        x: camera_pos.x + rad.sin() * distance_px,
        y: camera_pos.y - rad.cos() * distance_px,
    }
}

/// Floor-plan point for a discovered landmark, in plan pixels.
pub fn place_landmark(
    topology: &Topology,
    camera: &Camera,
    bounding_box: Option<&BoundingBox>,
    distance_feet: Option<f64>,
    index: usize,
) -> FloorPosition {
    let (Some(position), Some(fov)) = (camera.position, camera.field_of_view) else {
        return grid_position(index);
    };
    let offset = angular_offset_deg(fov.angle, bounding_box, index);
    let depth_px = depth_feet(camera, distance_feet) * topology.floor_plan_scale;
    project_along(position, fov.direction + offset, depth_px)
}

/// Annular wedge polygon for a discovered zone, in normalized 0-100
/// coordinates. Always `2 * ZONE_ARC_SAMPLES` vertices.
pub fn zone_polygon(
    topology: &Topology,
    camera: &Camera,
    bounding_box: Option<&BoundingBox>,
    distance_feet: Option<f64>,
    index: usize,
) -> Vec<PolygonPoint> {
    let (Some(position), Some(fov)) = (camera.position, camera.field_of_view) else {
        return fallback_square(topology, index);
    };

    let center = fov.direction + angular_offset_deg(fov.angle, bounding_box, index);
    let span = bounding_box
        .map(|b| (b.width * fov.angle).clamp(MIN_SPAN_DEG, fov.angle.max(MIN_SPAN_DEG)))
        .unwrap_or(FALLBACK_SPAN_DEG);

    let depth = depth_feet(camera, distance_feet);
    let inner_ft = (depth - ZONE_DEPTH_MARGIN_FEET).max(ZONE_MIN_INNER_FEET);
    let mut outer_ft = depth + ZONE_DEPTH_MARGIN_FEET;
    if fov.range > 0.0 {
        outer_ft = outer_ft.min(fov.range);
    }
    let outer_ft = outer_ft.max(inner_ft + 1.0);

    let scale = topology.floor_plan_scale;
    let mut polygon = Vec::with_capacity(ZONE_ARC_SAMPLES * 2);
    for i in 0..ZONE_ARC_SAMPLES {
        let t = i as f64 / (ZONE_ARC_SAMPLES - 1) as f64;
        let angle = center - span / 2.0 + t * span;
        polygon.push(normalize(
            topology,
            project_along(position, angle, inner_ft * scale),
        ));
    }
    for i in (0..ZONE_ARC_SAMPLES).rev() {
        let t = i as f64 / (ZONE_ARC_SAMPLES - 1) as f64;
        let angle = center - span / 2.0 + t * span;
        polygon.push(normalize(
            topology,
            project_along(position, angle, outer_ft * scale),
        ));
    }
    polygon
}

fn fallback_square(topology: &Topology, index: usize) -> Vec<PolygonPoint> {
    let center = normalize(topology, grid_position(index));
    let (x, y) = (center.x, center.y);
    let h = FALLBACK_ZONE_HALF;
    vec![
        PolygonPoint { x: (x - h).max(0.0), y: (y - h).max(0.0) },
        PolygonPoint { x: (x + h).min(100.0), y: (y - h).max(0.0) },
        PolygonPoint { x: (x + h).min(100.0), y: (y + h).min(100.0) },
        PolygonPoint { x: (x - h).max(0.0), y: (y + h).min(100.0) },
    ]
}
