//! Analysis Orchestrator: the per-job frame loop.
//!
//! Frames are consumed strictly in order. For each frame the detector runs
//! at the job's confidence threshold, the tracker reconciles detections
//! into identities, every confirmed identity is appended to the trajectory
//! store, and the frame's metrics are computed. Any failure aborts the
//! loop and discards everything accumulated so far.

use motility_core::detection::cap_detections;
use motility_core::metrics::{compute_frame_metrics, TrackedObject};
use motility_core::params::AnalysisParameters;
use motility_core::report::{FrameResult, VideoInfo};
use motility_core::trajectory::TrajectoryStore;
use tokio_util::sync::CancellationToken;

use crate::engine::{Detector, Frame, FrameStream, Tracker};
use crate::error::{PipelineError, PipelineResult};
use crate::lifecycle::ProgressSink;

/// Everything the frame loop produced, ready for the report builder.
#[derive(Debug)]
pub struct FrameLoopOutput {
    pub video_info: VideoInfo,
    pub frames: Vec<FrameResult>,
    pub trajectories: TrajectoryStore,
}

/// Drives one job's detector and tracker over a frame stream.
pub struct AnalysisOrchestrator {
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    parameters: AnalysisParameters,
    progress_interval_frames: u64,
}

impl AnalysisOrchestrator {
    pub fn new(
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        parameters: AnalysisParameters,
        progress_interval_frames: u64,
    ) -> Self {
        Self {
            detector,
            tracker,
            parameters,
            progress_interval_frames: progress_interval_frames.max(1),
        }
    }

    /// Consume `stream` to the end.
    ///
    /// Checks `cancel` before every read and while waiting on the source.
    pub async fn run(
        &mut self,
        stream: &mut dyn FrameStream,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> PipelineResult<FrameLoopOutput> {
        let video_info = stream.info().clone();
        let total = video_info.total_frames;
        let mut trajectories = TrajectoryStore::new();
        let mut frames: Vec<FrameResult> = Vec::new();
        let mut processed: u64 = 0;

        tracing::info!(
            total_frames = total,
            fps = video_info.fps,
            width = video_info.width,
            height = video_info.height,
            "Frame loop started",
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                next = stream.next_frame() => next.map_err(|e| e.at_frame(processed))?,
            };
            let Some(frame) = next else {
                break;
            };

            let result = self
                .process_frame(&frame, &video_info, &mut trajectories)
                .await
                .map_err(|e| e.at_frame(frame.index))?;
            frames.push(result);
            processed += 1;

            if processed % self.progress_interval_frames == 0 {
                progress.frames_processed(processed, total).await?;
                tracing::debug!(processed, total, "Frame progress");
            }
        }

        tracing::info!(
            frames = processed,
            identities = trajectories.identity_count(),
            "Frame loop finished",
        );

        Ok(FrameLoopOutput {
            video_info,
            frames,
            trajectories,
        })
    }

    /// Detection, tracking, trajectory update and metrics for one frame.
    async fn process_frame(
        &mut self,
        frame: &Frame,
        video_info: &VideoInfo,
        trajectories: &mut TrajectoryStore,
    ) -> PipelineResult<FrameResult> {
        let detections = self
            .detector
            .detect(frame, self.parameters.confidence_threshold)
            .await?;
        let detections = cap_detections(detections, self.parameters.max_detections);

        let tracks = self.tracker.update(frame, &detections).await?;

        let timestamp = video_info.frame_time(frame.index);
        let time_step = self.parameters.velocity_time_step();
        let mut objects = Vec::with_capacity(tracks.len());
        for track in &tracks {
            trajectories.record(track.track_id, frame.index, timestamp, track.center())?;
            let velocity = trajectories.instantaneous_velocity(track.track_id, time_step);
            objects.push(TrackedObject::new(track, velocity));
        }

        let metrics =
            compute_frame_metrics(&objects, self.parameters.motility_threshold, timestamp);

        Ok(FrameResult {
            frame_number: frame.index,
            timestamp,
            detection_count: detections.len(),
            track_count: tracks.len(),
            metrics,
        })
    }
}
