//! Capability interfaces for the external collaborators.
//!
//! The pipeline never decodes video or runs models itself. A frame source,
//! a detector and a tracker are plugged in through these traits so that
//! backends can be swapped without touching the orchestrator.

use async_trait::async_trait;
use motility_core::detection::{ConfirmedTrack, Detection};
use motility_core::params::AnalysisParameters;
use motility_core::report::VideoInfo;

use crate::error::PipelineResult;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position in the stream.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Raw pixel data, opaque to the pipeline.
    pub data: Vec<u8>,
}

/// An opened video, read strictly in order.
#[async_trait]
pub trait FrameStream: Send {
    /// Metadata captured when the stream was opened.
    fn info(&self) -> &VideoInfo;

    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> PipelineResult<Option<Frame>>;
}

/// Opens a source reference (path, URL, ...) as a [`FrameStream`].
#[async_trait]
pub trait FrameSourceOpener: Send + Sync {
    async fn open(&self, source: &str) -> PipelineResult<Box<dyn FrameStream>>;
}

/// Finds candidate objects in a frame.
#[async_trait]
pub trait Detector: Send {
    /// Detections at or above `confidence_threshold`.
    async fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> PipelineResult<Vec<Detection>>;
}

/// Links detections across frames into persistent identities.
#[async_trait]
pub trait Tracker: Send {
    /// Confirmed identities for this frame. Tentative tracks are never
    /// returned.
    async fn update(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
    ) -> PipelineResult<Vec<ConfirmedTrack>>;
}

/// Creates a fresh detector and tracker for each job.
///
/// Trackers are stateful; one instance must never serve two jobs.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn create_detector(
        &self,
        parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Detector>>;

    async fn create_tracker(
        &self,
        parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Tracker>>;
}
