//! Match scoring
//!
//! Pure functions combining temporal plausibility with optional visual
//! similarity. The temporal curve is a triangular taper: 1.0 exactly at
//! the connection's typical transit time, falling linearly to 0.0 at each
//! window edge. Both sides are monotonic, so earlier-than-typical and
//! later-than-typical arrivals degrade smoothly and independently.

use chrono::{DateTime, Utc};

use crate::config::TrackerSettings;

use super::candidates::{ArrivalWindow, OpenTransitCandidate};

/// Breakdown of one candidate-arrival evaluation
#[derive(Debug, Clone, Copy)]
pub struct MatchScore {
    pub combined: f64,
    pub temporal: f64,
    /// Present only when both sides carried embeddings
    pub visual: Option<f64>,
}

/// Temporal plausibility of an arrival inside `window`, in [0, 1].
pub fn temporal_plausibility(arrival: DateTime<Utc>, window: &ArrivalWindow) -> f64 {
    if !window.contains(arrival) {
        return 0.0;
    }
    let at = arrival.timestamp_millis() as f64;
    let earliest = window.earliest.timestamp_millis() as f64;
    let typical = window.typical.timestamp_millis() as f64;
    let latest = window.latest.timestamp_millis() as f64;

    if at <= typical {
        if typical <= earliest {
            1.0
        } else {
            (at - earliest) / (typical - earliest)
        }
    } else if latest <= typical {
        1.0
    } else {
        (latest - at) / (latest - typical)
    }
}

/// Cosine similarity of two embeddings. None when the vectors cannot be
/// compared (dimension mismatch, zero norm).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Score an arrival against one candidate window. Visual similarity is
/// blended only when enabled and both sides carry embeddings; otherwise
/// the temporal score stands alone.
pub fn score_arrival(
    candidate: &OpenTransitCandidate,
    window: &ArrivalWindow,
    arrival: DateTime<Utc>,
    arrival_embedding: Option<&[f32]>,
    settings: &TrackerSettings,
) -> MatchScore {
    let temporal = temporal_plausibility(arrival, window);

    let visual = if settings.use_visual_matching {
        match (candidate.embedding.as_deref(), arrival_embedding) {
            (Some(a), Some(b)) => cosine_similarity(a, b).map(|cos| (cos + 1.0) / 2.0),
            _ => None,
        }
    } else {
        None
    };

    let combined = match visual {
        Some(v) => temporal * (1.0 - settings.visual_weight) + v * settings.visual_weight,
        None => temporal,
    };

    MatchScore {
        combined,
        temporal,
        visual,
    }
}
