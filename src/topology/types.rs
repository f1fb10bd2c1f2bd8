//! Topology document types
//!
//! The topology is the single authoritative description of the camera
//! network: cameras on the floor plan, walkable connections between them,
//! zones, and landmarks. It round-trips through the host's storage as one
//! camelCase JSON document.

use serde::{Deserialize, Serialize};

/// Position on the floor plan, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorPosition {
    pub x: f64,
    pub y: f64,
}

impl FloorPosition {
    pub fn distance_to(&self, other: &FloorPosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Camera field of view on the floor plan.
///
/// `direction` is compass-style: degrees clockwise from plan-up (0 = up,
/// 90 = right). `angle` is the full cone width in degrees, `range` the
/// usable depth in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOfView {
    pub direction: f64,
    pub angle: f64,
    pub range: f64,
}

/// Transit time envelope for a connection, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitRange {
    pub min: u64,
    pub typical: u64,
    pub max: u64,
}

impl TransitRange {
    /// Envelope around an observed typical value: half below, double above.
    pub fn around_typical(typical_ms: u64) -> Self {
        let typical = typical_ms.max(1);
        Self {
            min: typical / 2,
            typical,
            max: typical * 2,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.typical && self.typical <= self.max
    }
}

/// Camera node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<FloorPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_of_view: Option<FieldOfView>,
    /// Marks a property edge: objects departing here may have left the site
    #[serde(default)]
    pub boundary: bool,
}

/// Directed (or bidirectional) walkable edge between two cameras
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub from_camera: String,
    pub to_camera: String,
    pub bidirectional: bool,
    pub transit_time: TransitRange,
    /// Where objects appear on the destination camera, frame-normalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_zone: Option<Vec<PolygonPoint>>,
    /// Where objects disappear on the source camera, frame-normalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_zone: Option<Vec<PolygonPoint>>,
}

/// Polygon vertex in normalized 0-100 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonPoint {
    pub x: f64,
    pub y: f64,
}

/// Ray-cast point-in-polygon test over normalized vertices.
pub fn polygon_contains(polygon: &[PolygonPoint], x: f64, y: f64) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if (pi.y > y) != (pj.y > y)
            && x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Entry,
    Dwell,
    Restricted,
}

/// Named region of the floor plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    /// Floor-plan polygon in normalized 0-100 coordinates
    pub polygon: Vec<PolygonPoint>,
    #[serde(default)]
    pub visible_from: Vec<String>,
    #[serde(default)]
    pub ai_suggested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkKind {
    Mailbox,
    Garage,
    Pool,
    Door,
    Gate,
    Driveway,
    Other,
}

/// Fixed point of interest on the floor plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    pub id: String,
    pub name: String,
    pub kind: LandmarkKind,
    pub position: FloorPosition,
    #[serde(default)]
    pub visible_from: Vec<String>,
    #[serde(default)]
    pub ai_suggested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
}

/// Floor-plan image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorPlanSize {
    pub width: f64,
    pub height: f64,
}

/// The whole camera-network document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    /// Floor-plan pixels per foot
    #[serde(default = "default_scale")]
    pub floor_plan_scale: f64,
    /// Needed to normalize projected zone polygons; hosts without a floor
    /// plan image can omit it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_plan_size: Option<FloorPlanSize>,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            connections: Vec::new(),
            zones: Vec::new(),
            landmarks: Vec::new(),
            floor_plan_scale: 1.0,
            floor_plan_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transit_range_around_typical() {
        let range = TransitRange::around_typical(10_000);
        assert_eq!(range.min, 5_000);
        assert_eq!(range.typical, 10_000);
        assert_eq!(range.max, 20_000);
        assert!(range.is_ordered());
    }

    #[test]
    fn polygon_contains_square() {
        let square = vec![
            PolygonPoint { x: 10.0, y: 10.0 },
            PolygonPoint { x: 40.0, y: 10.0 },
            PolygonPoint { x: 40.0, y: 40.0 },
            PolygonPoint { x: 10.0, y: 40.0 },
        ];
        assert!(polygon_contains(&square, 25.0, 25.0));
        assert!(!polygon_contains(&square, 55.0, 25.0));
        assert!(!polygon_contains(&square[..2].to_vec(), 25.0, 25.0));
    }

    #[test]
    fn topology_document_round_trip() {
        let topology = Topology {
            cameras: vec![Camera {
                id: "front".to_string(),
                name: "Front Door".to_string(),
                position: Some(FloorPosition { x: 120.0, y: 80.0 }),
                field_of_view: Some(FieldOfView {
                    direction: 180.0,
                    angle: 90.0,
                    range: 30.0,
                }),
                boundary: true,
            }],
            connections: Vec::new(),
            zones: Vec::new(),
            landmarks: Vec::new(),
            floor_plan_scale: 4.0,
            floor_plan_size: None,
        };
        let json = serde_json::to_string(&topology).unwrap();
        assert!(json.contains("\"fieldOfView\""));
        assert!(json.contains("\"floorPlanScale\""));
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(back, topology);
    }
}
