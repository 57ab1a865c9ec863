//! Frame Metric Calculator: instantaneous numbers for one frame.
//!
//! Density is normalized against a fixed 640x480 reference area, not the
//! video's real resolution. Values are only comparable between jobs that
//! share this constant.

use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, ConfirmedTrack, Point};
use crate::types::TrackId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Reference frame area in pixels used as the density denominator.
pub const REFERENCE_FRAME_AREA: f64 = 640.0 * 480.0;

/// Density is reported as objects per this many pixels.
pub const DENSITY_SCALE: f64 = 10_000.0;

// ---------------------------------------------------------------------------
// TrackedObject
// ---------------------------------------------------------------------------

/// A confirmed track in the current frame, with its instantaneous velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub center: Point,
    /// Pixels per second over the last frame step.
    pub velocity: f64,
}

impl TrackedObject {
    pub fn new(track: &ConfirmedTrack, velocity: f64) -> Self {
        Self {
            track_id: track.track_id,
            bbox: track.bbox,
            center: track.center(),
            velocity,
        }
    }

    pub fn is_motile(&self, motility_threshold: f64) -> bool {
        self.velocity > motility_threshold
    }
}

// ---------------------------------------------------------------------------
// FrameMetrics
// ---------------------------------------------------------------------------

/// Per-frame counts and rates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub active_sperm: usize,
    pub motile_sperm: usize,
    /// `motile / active * 100`, 0 when nothing is active.
    pub motility_percentage: f64,
    pub average_velocity: f64,
    pub density: f64,
    /// Video time of the frame in seconds.
    pub timestamp: f64,
}

/// Compute the metrics for one frame from its tracked objects.
pub fn compute_frame_metrics(
    objects: &[TrackedObject],
    motility_threshold: f64,
    timestamp: f64,
) -> FrameMetrics {
    let active = objects.len();
    if active == 0 {
        return FrameMetrics {
            timestamp,
            ..FrameMetrics::default()
        };
    }

    let motile = objects
        .iter()
        .filter(|o| o.is_motile(motility_threshold))
        .count();
    let velocity_sum: f64 = objects.iter().map(|o| o.velocity).sum();

    FrameMetrics {
        active_sperm: active,
        motile_sperm: motile,
        motility_percentage: motile as f64 / active as f64 * 100.0,
        average_velocity: velocity_sum / active as f64,
        density: active as f64 / REFERENCE_FRAME_AREA * DENSITY_SCALE,
        timestamp,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
