//! Replay engine: plays back pre-computed annotations from a JSON fixture.
//!
//! A fixture lists, per frame, the objects a real detector would have found
//! together with the identity a real tracker would have assigned. The
//! replay stream carries each frame's objects as the frame payload; the
//! replay detector and tracker decode it, so the whole pipeline runs
//! without a video decoder or model weights.
//!
//! The tracker still behaves like one: an identity is only confirmed after
//! [`DEFAULT_CONFIRM_HITS`] consecutive sightings, a tentative identity is
//! dropped on its first miss, and a confirmed one expires after
//! `max_track_age` missed frames. An expired identity that reappears gets a
//! fresh id.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use motility_core::detection::{BoundingBox, ConfirmedTrack, Detection};
use motility_core::params::AnalysisParameters;
use motility_core::report::VideoInfo;
use motility_core::types::TrackId;
use motility_pipeline::engine::{
    AnalysisEngine, Detector, Frame, FrameSourceOpener, FrameStream, Tracker,
};
use motility_pipeline::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Consecutive sightings before an identity is reported.
pub const DEFAULT_CONFIRM_HITS: u32 = 3;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayObject {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(default)]
    pub class_id: u32,
    #[serde(default = "default_class_label")]
    pub class_label: String,
}

fn default_class_label() -> String {
    "sperm".to_string()
}

fn default_format() -> String {
    "replay".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFixture {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default = "default_format")]
    pub format: String,
    /// Objects per frame, in frame order.
    pub frames: Vec<Vec<ReplayObject>>,
}

impl ReplayFixture {
    pub async fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        serde_json::from_slice(&body).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: invalid fixture: {e}", path.display()))
        })
    }

    pub fn video_info(&self) -> VideoInfo {
        VideoInfo::new(
            self.width,
            self.height,
            self.fps,
            self.frames.len() as u64,
            self.format.clone(),
        )
    }
}

fn decode_objects(frame: &Frame) -> PipelineResult<Vec<ReplayObject>> {
    Ok(serde_json::from_slice(&frame.data)?)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Frame source, detector and tracker backed by fixture files.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    confirm_hits: u32,
}

impl ReplayEngine {
    pub fn new(confirm_hits: u32) -> Self {
        Self {
            confirm_hits: confirm_hits.max(1),
        }
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_HITS)
    }
}

#[async_trait]
impl FrameSourceOpener for ReplayEngine {
    async fn open(&self, source: &str) -> PipelineResult<Box<dyn FrameStream>> {
        let fixture = ReplayFixture::load(source).await?;
        tracing::debug!(source, frames = fixture.frames.len(), "Replay fixture loaded");
        Ok(Box::new(ReplayStream::new(fixture)))
    }
}

#[async_trait]
impl AnalysisEngine for ReplayEngine {
    async fn create_detector(
        &self,
        _parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Detector>> {
        Ok(Box::new(ReplayDetector))
    }

    async fn create_tracker(
        &self,
        parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Tracker>> {
        Ok(Box::new(ReplayTracker::new(
            self.confirm_hits,
            parameters.max_track_age,
        )))
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

pub struct ReplayStream {
    info: VideoInfo,
    frames: std::vec::IntoIter<Vec<ReplayObject>>,
    next_index: u64,
}

impl ReplayStream {
    pub fn new(fixture: ReplayFixture) -> Self {
        Self {
            info: fixture.video_info(),
            frames: fixture.frames.into_iter(),
            next_index: 0,
        }
    }
}

#[async_trait]
impl FrameStream for ReplayStream {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        let Some(objects) = self.frames.next() else {
            return Ok(None);
        };
        let frame = Frame {
            index: self.next_index,
            width: self.info.width,
            height: self.info.height,
            data: serde_json::to_vec(&objects)?,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct ReplayDetector;

#[async_trait]
impl Detector for ReplayDetector {
    async fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> PipelineResult<Vec<Detection>> {
        Ok(decode_objects(frame)?
            .into_iter()
            .filter(|o| o.confidence >= confidence_threshold)
            .map(|o| Detection::new(o.bbox, o.confidence, o.class_id, o.class_label))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Tentative,
    Confirmed,
}

#[derive(Debug)]
struct ReplayTrack {
    id: TrackId,
    state: TrackState,
    hits: u32,
    /// Consecutive frames without a matching detection.
    misses: u32,
}

pub struct ReplayTracker {
    confirm_hits: u32,
    max_age: u32,
    next_id: TrackId,
    /// Keyed by the fixture's identity.
    tracks: HashMap<TrackId, ReplayTrack>,
}

impl ReplayTracker {
    pub fn new(confirm_hits: u32, max_age: u32) -> Self {
        Self {
            confirm_hits: confirm_hits.max(1),
            max_age,
            next_id: 1,
            tracks: HashMap::new(),
        }
    }

    /// Reconcile one frame's matches, returning confirmed `(id, bbox)`s in
    /// detection order.
    fn step(&mut self, matches: &[(TrackId, BoundingBox)]) -> Vec<ConfirmedTrack> {
        let mut confirmed = Vec::new();
        let mut seen = Vec::with_capacity(matches.len());

        for &(fixture_id, bbox) in matches {
            if seen.contains(&fixture_id) {
                continue;
            }
            seen.push(fixture_id);

            let track = self.tracks.entry(fixture_id).or_insert_with(|| {
                let id = self.next_id;
                self.next_id += 1;
                ReplayTrack {
                    id,
                    state: TrackState::Tentative,
                    hits: 0,
                    misses: 0,
                }
            });
            track.hits += 1;
            track.misses = 0;
            if track.hits >= self.confirm_hits {
                track.state = TrackState::Confirmed;
            }
            if track.state == TrackState::Confirmed {
                confirmed.push(ConfirmedTrack::new(track.id, bbox));
            }
        }

        let max_age = self.max_age;
        self.tracks.retain(|fixture_id, track| {
            if seen.contains(fixture_id) {
                return true;
            }
            track.misses += 1;
            track.state == TrackState::Confirmed && track.misses <= max_age
        });

        confirmed
    }
}

#[async_trait]
impl Tracker for ReplayTracker {
    async fn update(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
    ) -> PipelineResult<Vec<ConfirmedTrack>> {
        let objects = decode_objects(frame)?;
        let matches: Vec<(TrackId, BoundingBox)> = detections
            .iter()
            .filter_map(|d| {
                objects
                    .iter()
                    .find(|o| o.bbox == d.bbox)
                    .map(|o| (o.track_id, d.bbox))
            })
            .collect();
        Ok(self.step(&matches))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
