//! Track Aggregator: whole-video reduction of the trajectory store.
//!
//! Runs once after the frame loop. Only identities with at least two
//! samples produce a [`TrackAnalysis`]; output order follows the store's
//! first-seen order.

use serde::{Deserialize, Serialize};

use crate::trajectory::{Trajectory, TrajectoryStore};
use crate::types::TrackId;

/// Identities with fewer samples than this are left out of the analysis.
pub const MIN_SAMPLES_FOR_ANALYSIS: usize = 2;

/// Per-identity motion summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    pub track_id: TrackId,
    /// Seconds, `positions_count / fps`.
    pub duration: f64,
    /// Sum of consecutive-sample distances in pixels.
    pub total_distance: f64,
    /// `total_distance / duration`, 0 when duration is 0.
    pub average_speed: f64,
    pub positions_count: usize,
    pub is_motile: bool,
}

/// Summarize one trajectory, or `None` if it has too few samples.
pub fn analyze_trajectory(
    trajectory: &Trajectory,
    fps: f64,
    motility_threshold: f64,
) -> Option<TrackAnalysis> {
    let count = trajectory.len();
    if count < MIN_SAMPLES_FOR_ANALYSIS {
        return None;
    }

    let total_distance = trajectory.path_length();
    let duration = if fps > 0.0 { count as f64 / fps } else { 0.0 };
    let average_speed = if duration > 0.0 {
        total_distance / duration
    } else {
        0.0
    };

    Some(TrackAnalysis {
        track_id: trajectory.track_id,
        duration,
        total_distance,
        average_speed,
        positions_count: count,
        is_motile: average_speed > motility_threshold,
    })
}

/// Summarize every eligible identity in `store`.
///
/// Does not mutate the store; calling it twice yields identical output.
pub fn aggregate_tracks(
    store: &TrajectoryStore,
    fps: f64,
    motility_threshold: f64,
) -> Vec<TrackAnalysis> {
    store
        .iter()
        .filter_map(|t| analyze_trajectory(t, fps, motility_threshold))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
