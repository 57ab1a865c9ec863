//! Per-identity position history for one analysis job.
//!
//! The store keeps identities in first-seen order (an [`IndexMap`]), so
//! aggregation output is stable across runs without sorting by id.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::detection::Point;
use crate::error::CoreError;
use crate::types::TrackId;

/// One recorded position of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub frame_index: u64,
    pub position: Point,
}

/// Time-ordered samples for a single tracker identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub track_id: TrackId,
    samples: Vec<TrajectorySample>,
    /// Video time (seconds) of the first sample.
    pub first_seen: f64,
    /// Video time (seconds) of the latest sample.
    pub last_seen: f64,
}

impl Trajectory {
    fn new(track_id: TrackId, timestamp: f64) -> Self {
        Self {
            track_id,
            samples: Vec::new(),
            first_seen: timestamp,
            last_seen: timestamp,
        }
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_position(&self) -> Option<Point> {
        self.samples.last().map(|s| s.position)
    }

    /// Sum of Euclidean distances between consecutive samples.
    pub fn path_length(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|pair| pair[0].position.distance_to(&pair[1].position))
            .sum()
    }

    /// Distance between the two most recent samples, if there are two.
    pub fn last_step_distance(&self) -> Option<f64> {
        match self.samples.as_slice() {
            [.., prev, last] => Some(prev.position.distance_to(&last.position)),
            _ => None,
        }
    }
}

/// Identity -> trajectory table, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStore {
    tracks: IndexMap<TrackId, Trajectory>,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a position for `track_id`, creating the entry on first sight.
    ///
    /// Samples must arrive in strictly increasing frame order; a sample
    /// for a frame at or before the latest recorded one is rejected.
    pub fn record(
        &mut self,
        track_id: TrackId,
        frame_index: u64,
        timestamp: f64,
        position: Point,
    ) -> Result<(), CoreError> {
        let trajectory = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| Trajectory::new(track_id, timestamp));

        if let Some(last) = trajectory.samples.last() {
            if frame_index <= last.frame_index {
                return Err(CoreError::Conflict(format!(
                    "track {track_id}: sample for frame {frame_index} is not after frame {}",
                    last.frame_index
                )));
            }
        }

        trajectory.samples.push(TrajectorySample {
            frame_index,
            position,
        });
        trajectory.last_seen = timestamp;
        Ok(())
    }

    /// Instantaneous velocity (px/s) of `track_id` over its last step.
    ///
    /// `0.0` when the identity is unknown or has fewer than two samples.
    pub fn instantaneous_velocity(&self, track_id: TrackId, time_step: f64) -> f64 {
        if time_step <= 0.0 {
            return 0.0;
        }
        self.tracks
            .get(&track_id)
            .and_then(Trajectory::last_step_distance)
            .map(|d| d / time_step)
            .unwrap_or(0.0)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Trajectory> {
        self.tracks.get(&track_id)
    }

    /// Iterate trajectories in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.tracks.values()
    }

    /// Number of distinct identities ever recorded.
    pub fn identity_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
