//! Graph queries over the topology document
//!
//! ## Responsibilities
//!
//! - Camera lookup by id or display name
//! - Outgoing-edge and edge-between queries honoring bidirectionality
//! - Structural validation before a document becomes authoritative

use crate::error::{Error, Result};

use super::types::{Camera, Connection, Topology};

impl Topology {
    pub fn camera(&self, camera_id: &str) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.id == camera_id)
    }

    /// Resolve a camera reference by id first, then by display name
    /// (case-insensitive). External suggestions often carry names.
    pub fn resolve_camera(&self, key: &str) -> Option<&Camera> {
        self.camera(key).or_else(|| {
            self.cameras
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(key))
        })
    }

    /// Connections an object can depart along from `camera_id`. Includes
    /// the reverse direction of bidirectional edges.
    pub fn neighbors(&self, camera_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| {
                c.from_camera == camera_id || (c.bidirectional && c.to_camera == camera_id)
            })
            .collect()
    }

    /// Edge usable for travel `from` -> `to`, if one exists.
    pub fn find_connection(&self, from: &str, to: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| {
            (c.from_camera == from && c.to_camera == to)
                || (c.bidirectional && c.from_camera == to && c.to_camera == from)
        })
    }

    /// Structural checks a document must pass before it replaces the
    /// authoritative topology. Violations keep the previous document live.
    pub fn validate(&self) -> Result<()> {
        if !(self.floor_plan_scale.is_finite() && self.floor_plan_scale > 0.0) {
            return Err(Error::Validation(format!(
                "floorPlanScale must be positive, got {}",
                self.floor_plan_scale
            )));
        }
        if let Some(size) = &self.floor_plan_size {
            if !(size.width.is_finite() && size.width > 0.0)
                || !(size.height.is_finite() && size.height > 0.0)
            {
                return Err(Error::Validation("floorPlanSize must be positive".into()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(Error::Validation("camera with empty id".into()));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate camera id {}",
                    camera.id
                )));
            }
        }

        for conn in &self.connections {
            if conn.from_camera == conn.to_camera {
                return Err(Error::Validation(format!(
                    "connection {} is a self-loop on {}",
                    conn.id, conn.from_camera
                )));
            }
            for endpoint in [&conn.from_camera, &conn.to_camera] {
                if self.camera(endpoint).is_none() {
                    return Err(Error::Validation(format!(
                        "connection {} references unknown camera {}",
                        conn.id, endpoint
                    )));
                }
            }
            if !conn.transit_time.is_ordered() {
                return Err(Error::Validation(format!(
                    "connection {} transit time out of order (min {} typical {} max {})",
                    conn.id, conn.transit_time.min, conn.transit_time.typical, conn.transit_time.max
                )));
            }
            if conn.transit_time.max == 0 {
                return Err(Error::Validation(format!(
                    "connection {} has a zero-width transit window",
                    conn.id
                )));
            }
        }

        for zone in &self.zones {
            if zone.polygon.len() < 3 {
                return Err(Error::Validation(format!(
                    "zone {} polygon needs at least 3 points",
                    zone.id
                )));
            }
            for cam in &zone.visible_from {
                if self.camera(cam).is_none() {
                    return Err(Error::Validation(format!(
                        "zone {} references unknown camera {}",
                        zone.id, cam
                    )));
                }
            }
        }

        for landmark in &self.landmarks {
            for cam in &landmark.visible_from {
                if self.camera(cam).is_none() {
                    return Err(Error::Validation(format!(
                        "landmark {} references unknown camera {}",
                        landmark.id, cam
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::*;

    fn cam(id: &str) -> Camera {
        Camera {
            id: id.to_string(),
            name: format!("{} cam", id),
            position: None,
            field_of_view: None,
            boundary: false,
        }
    }

    fn conn(id: &str, from: &str, to: &str, bidirectional: bool) -> Connection {
        Connection {
            id: id.to_string(),
            from_camera: from.to_string(),
            to_camera: to.to_string(),
            bidirectional,
            transit_time: TransitRange::around_typical(10_000),
            entry_zone: None,
            exit_zone: None,
        }
    }

    fn base() -> Topology {
        Topology {
            cameras: vec![cam("a"), cam("b"), cam("c")],
            connections: vec![conn("ab", "a", "b", true), conn("bc", "b", "c", false)],
            ..Topology::default()
        }
    }

    #[test]
    fn neighbors_include_reverse_of_bidirectional() {
        let topology = base();
        let from_b: Vec<&str> = topology
            .neighbors("b")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert!(from_b.contains(&"ab"));
        assert!(from_b.contains(&"bc"));
        // c has no outgoing edges: bc is one-way into it
        assert!(topology.neighbors("c").is_empty());
    }

    #[test]
    fn find_connection_honors_direction() {
        let topology = base();
        assert!(topology.find_connection("a", "b").is_some());
        assert!(topology.find_connection("b", "a").is_some());
        assert!(topology.find_connection("b", "c").is_some());
        assert!(topology.find_connection("c", "b").is_none());
    }

    #[test]
    fn resolve_camera_by_name_is_case_insensitive() {
        let topology = base();
        assert_eq!(topology.resolve_camera("A CAM").map(|c| c.id.as_str()), Some("a"));
        assert_eq!(topology.resolve_camera("a").map(|c| c.id.as_str()), Some("a"));
        assert!(topology.resolve_camera("nope").is_none());
    }

    #[test]
    fn validate_rejects_broken_documents() {
        let mut t = base();
        t.connections.push(conn("bad", "a", "ghost", false));
        assert!(t.validate().is_err());

        let mut t = base();
        t.cameras.push(cam("a"));
        assert!(t.validate().is_err());

        let mut t = base();
        t.connections[0].transit_time = TransitRange {
            min: 20_000,
            typical: 10_000,
            max: 30_000,
        };
        assert!(t.validate().is_err());

        let mut t = base();
        t.floor_plan_scale = 0.0;
        assert!(t.validate().is_err());

        assert!(base().validate().is_ok());
    }
}
