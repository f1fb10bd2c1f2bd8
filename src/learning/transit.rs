//! Transit time learner
//!
//! Every confirmed cross-camera match carries an observed transit
//! duration. The learner folds it into the connection's typical time with
//! an exponential moving average, widening the max bound when reality
//! exceeds it rather than discarding the observation.

use std::sync::Arc;

use tracing::debug;

use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::topology::TopologyService;

/// TransitTimeLearner instance
pub struct TransitTimeLearner {
    topology: Arc<TopologyService>,
    smoothing: f64,
    enabled: bool,
}

impl TransitTimeLearner {
    pub fn new(topology: Arc<TopologyService>, settings: &TrackerSettings) -> Self {
        Self {
            topology,
            smoothing: settings.transit_smoothing,
            enabled: settings.enable_transit_time_learning,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Fold one observed transit into the connection's envelope.
    pub async fn observe(&self, connection_id: &str, observed_ms: u64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let smoothing = self.smoothing;
        let conn_id = connection_id.to_string();
        self.topology
            .apply(move |topology| {
                let conn = topology
                    .connections
                    .iter_mut()
                    .find(|c| c.id == conn_id)
                    .ok_or_else(|| Error::NotFound(format!("connection {conn_id}")))?;

                let range = &mut conn.transit_time;
                if observed_ms > range.max {
                    range.max = observed_ms;
                }
                let blended = smoothing * observed_ms as f64
                    + (1.0 - smoothing) * range.typical as f64;
                range.typical = (blended.round() as u64).clamp(range.min, range.max);

                debug!(
                    connection_id = %conn_id,
                    observed_ms,
                    typical_ms = range.typical,
                    max_ms = range.max,
                    "Refined transit time"
                );
                Ok(())
            })
            .await?;
        Ok(())
    }
}
