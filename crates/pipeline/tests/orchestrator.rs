//! Integration tests for the frame loop and report persistence.

mod common;

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use common::{boxed, linear_script, three_frame_script, ScriptedEngine, ScriptedSources};
use motility_core::detection::{BoundingBox, ConfirmedTrack, Detection};
use motility_core::params::AnalysisParameters;
use motility_core::report::build_report;
use motility_pipeline::engine::{
    AnalysisEngine, Detector, Frame, FrameSourceOpener, Tracker,
};
use motility_pipeline::lifecycle::ProgressSink;
use motility_pipeline::orchestrator::{AnalysisOrchestrator, FrameLoopOutput};
use motility_pipeline::report_store::{JsonReportStore, ReportStore};
use motility_pipeline::{PipelineError, PipelineResult};
use tokio_util::sync::CancellationToken;

/// Records every progress call.
#[derive(Default)]
struct RecordingProgress {
    calls: Mutex<Vec<(u64, u64)>>,
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn frames_processed(&self, processed: u64, total: u64) -> PipelineResult<()> {
        self.calls.lock().unwrap().push((processed, total));
        Ok(())
    }
}

async fn run_script(
    engine: &ScriptedEngine,
    sources: &ScriptedSources,
    parameters: AnalysisParameters,
    interval: u64,
    progress: &RecordingProgress,
) -> PipelineResult<FrameLoopOutput> {
    let detector = engine.create_detector(&parameters).await?;
    let tracker = engine.create_tracker(&parameters).await?;
    let mut stream = sources.open("clip.mp4").await?;
    let mut orchestrator = AnalysisOrchestrator::new(detector, tracker, parameters, interval);
    orchestrator
        .run(stream.as_mut(), progress, &CancellationToken::new())
        .await
}

// ---------------------------------------------------------------------------
// Test: frame loop output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn frame_results_follow_stream_order() {
    let script = three_frame_script();
    let progress = RecordingProgress::default();
    let output = run_script(
        &ScriptedEngine::new(script.clone()),
        &ScriptedSources::new(script),
        AnalysisParameters::default(),
        30,
        &progress,
    )
    .await
    .unwrap();

    let numbers: Vec<u64> = output.frames.iter().map(|f| f.frame_number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert!((output.frames[2].timestamp - 2.0 / 30.0).abs() < 1e-12);
    assert_eq!(output.frames[0].detection_count, 1);
    assert_eq!(output.frames[0].track_count, 1);
    assert_eq!(output.trajectories.identity_count(), 1);
    assert_eq!(output.trajectories.get(1).unwrap().len(), 3);
    assert!(progress.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn progress_is_published_every_interval() {
    let script = linear_script(10);
    let progress = RecordingProgress::default();
    run_script(
        &ScriptedEngine::new(script.clone()),
        &ScriptedSources::new(script),
        AnalysisParameters::default(),
        3,
        &progress,
    )
    .await
    .unwrap();

    assert_eq!(*progress.calls.lock().unwrap(), vec![(3, 10), (6, 10), (9, 10)]);
}

#[tokio::test]
async fn detector_failure_is_attributed_to_frame() {
    let script = linear_script(4);
    let mut engine = ScriptedEngine::new(script.clone());
    engine.fail_detect_at = Some(3);
    let err = run_script(
        &engine,
        &ScriptedSources::new(script),
        AnalysisParameters::default(),
        30,
        &RecordingProgress::default(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, PipelineError::FrameFailure { frame_index: 3, .. });
}

#[tokio::test]
async fn duplicate_identity_in_one_frame_fails() {
    let script = vec![vec![(7, boxed(0.0, 0.0)), (7, boxed(5.0, 5.0))]];
    let err = run_script(
        &ScriptedEngine::new(script.clone()),
        &ScriptedSources::new(script),
        AnalysisParameters::default(),
        30,
        &RecordingProgress::default(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, PipelineError::FrameFailure { frame_index: 0, .. });
}

#[tokio::test]
async fn cancelled_token_stops_loop() {
    let script = linear_script(5);
    let engine = ScriptedEngine::new(script.clone());
    let sources = ScriptedSources::new(script);
    let parameters = AnalysisParameters::default();

    let detector = engine.create_detector(&parameters).await.unwrap();
    let tracker = engine.create_tracker(&parameters).await.unwrap();
    let mut stream = sources.open("clip.mp4").await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut orchestrator = AnalysisOrchestrator::new(detector, tracker, parameters, 30);
    let result = orchestrator
        .run(stream.as_mut(), &RecordingProgress::default(), &cancel)
        .await;
    assert_matches!(result, Err(PipelineError::Cancelled));
}

// ---------------------------------------------------------------------------
// Test: detections are capped before tracking
// ---------------------------------------------------------------------------

struct FloodDetector;

#[async_trait]
impl Detector for FloodDetector {
    async fn detect(&mut self, _frame: &Frame, _threshold: f64) -> PipelineResult<Vec<Detection>> {
        Ok((0..10)
            .map(|i| Detection::new(boxed(i as f64 * 10.0, 0.0), (i + 1) as f64 / 16.0, 0, "sperm"))
            .collect())
    }
}

/// Confirms every detection it is given, recording how many it saw.
struct CountingTracker {
    seen: Arc<Mutex<Vec<Vec<f64>>>>,
}

#[async_trait]
impl Tracker for CountingTracker {
    async fn update(
        &mut self,
        _frame: &Frame,
        detections: &[Detection],
    ) -> PipelineResult<Vec<ConfirmedTrack>> {
        self.seen
            .lock()
            .unwrap()
            .push(detections.iter().map(|d| d.confidence).collect());
        Ok(detections
            .iter()
            .enumerate()
            .map(|(i, d)| ConfirmedTrack::new(i as u64, d.bbox))
            .collect())
    }
}

#[tokio::test]
async fn max_detections_keeps_most_confident() {
    let parameters = AnalysisParameters {
        max_detections: 3,
        ..AnalysisParameters::default()
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut orchestrator = AnalysisOrchestrator::new(
        Box::new(FloodDetector),
        Box::new(CountingTracker { seen: seen.clone() }),
        parameters,
        30,
    );
    let sources = ScriptedSources::new(vec![Vec::new()]);
    let mut stream = sources.open("clip.mp4").await.unwrap();

    let output = orchestrator
        .run(stream.as_mut(), &RecordingProgress::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.frames[0].detection_count, 3);
    assert_eq!(output.frames[0].metrics.active_sperm, 3);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], vec![0.625, 0.5625, 0.5]);
}

// ---------------------------------------------------------------------------
// Test: JSON report store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn json_report_store_roundtrip_and_delete() {
    let script = three_frame_script();
    let parameters = AnalysisParameters::default();
    let output = run_script(
        &ScriptedEngine::new(script.clone()),
        &ScriptedSources::new(script),
        parameters.clone(),
        30,
        &RecordingProgress::default(),
    )
    .await
    .unwrap();
    let report = build_report(
        uuid::Uuid::new_v4(),
        output.video_info,
        output.frames,
        &output.trajectories,
        parameters,
        Utc::now(),
    );

    let dir = tempfile::tempdir().unwrap();
    let store = JsonReportStore::new(dir.path().join("results"));

    let result_ref = store.save(&report).await.unwrap();
    let expected = dir
        .path()
        .join("results")
        .join(format!("{}_results.json", report.analysis_id));
    assert_eq!(std::path::Path::new(&result_ref), expected.as_path());
    assert!(expected.exists());

    let loaded = store.load(&result_ref).await.unwrap();
    assert_eq!(loaded.analysis_id, report.analysis_id);
    assert_eq!(loaded.summary, report.summary);
    assert_eq!(loaded.frames.len(), 3);
    assert_eq!(loaded.tracks.len(), 1);

    store.delete(&result_ref).await.unwrap();
    assert!(!expected.exists());
    // Deleting twice is fine.
    store.delete(&result_ref).await.unwrap();
}

#[test]
fn bounding_box_helper_is_centred() {
    let b: BoundingBox = boxed(10.0, 4.0);
    assert_eq!(b.center().x, 10.0);
    assert_eq!(b.center().y, 4.0);
}
