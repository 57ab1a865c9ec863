//! Per-frame geometry shared by the detector, tracker, and metric code.
//!
//! [`Detection`] is what the external detector emits for one frame;
//! [`ConfirmedTrack`] is what the external tracker hands back once a
//! detection has been linked to a persistent identity.

use serde::{Deserialize, Serialize};

use crate::types::TrackId;

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A position in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

// ---------------------------------------------------------------------------
// BoundingBox
// ---------------------------------------------------------------------------

/// Axis-aligned box in `(x1, y1, x2, y2)` corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One candidate object found by the detector in a single frame.
///
/// Ephemeral: produced and consumed within one frame's processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub class_id: u32,
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, class_id: u32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_label: class_label.into(),
        }
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }

    /// `(width, height)` of the bounding box.
    pub fn size(&self) -> (f64, f64) {
        (self.bbox.width(), self.bbox.height())
    }
}

/// Keep at most `max` detections, highest confidence first.
///
/// Ties keep their original order so the result is deterministic.
pub fn cap_detections(mut detections: Vec<Detection>, max: usize) -> Vec<Detection> {
    if detections.len() <= max {
        return detections;
    }
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(max);
    detections
}

// ---------------------------------------------------------------------------
// ConfirmedTrack
// ---------------------------------------------------------------------------

/// A tracker identity confirmed for the current frame.
///
/// Tentative tracks never reach the core; the tracker filters them out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTrack {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
}

impl ConfirmedTrack {
    pub fn new(track_id: TrackId, bbox: BoundingBox) -> Self {
        Self { track_id, bbox }
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
