#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use motility_core::detection::{BoundingBox, ConfirmedTrack, Detection};
use motility_core::job::{Job, JobStatus};
use motility_core::params::AnalysisParameters;
use motility_core::report::VideoInfo;
use motility_core::types::{JobId, TrackId};
use motility_pipeline::engine::{
    AnalysisEngine, Detector, Frame, FrameSourceOpener, FrameStream, Tracker,
};
use motility_pipeline::report_store::InMemoryReportStore;
use motility_pipeline::store::{InMemoryJobStore, JobStore};
use motility_pipeline::{AnalysisService, PipelineConfig, PipelineError, PipelineResult};
use tokio::sync::Semaphore;

/// Confirmed objects per frame: `script[frame_index]`.
pub type Script = Vec<Vec<(TrackId, BoundingBox)>>;

/// A 4x4 box centred on `(x, y)`.
pub fn boxed(x: f64, y: f64) -> BoundingBox {
    BoundingBox::new(x - 2.0, y - 2.0, x + 2.0, y + 2.0)
}

/// One identity at (0,0), (10,0), (10,10).
pub fn three_frame_script() -> Script {
    vec![
        vec![(1, boxed(0.0, 0.0))],
        vec![(1, boxed(10.0, 0.0))],
        vec![(1, boxed(10.0, 10.0))],
    ]
}

/// `frames` frames with one identity moving 1px per frame.
pub fn linear_script(frames: usize) -> Script {
    (0..frames).map(|i| vec![(1, boxed(i as f64, 0.0))]).collect()
}

// ---------------------------------------------------------------------------
// Frame source
// ---------------------------------------------------------------------------

/// Serves `script.len()` empty frames.
///
/// With a gate, every frame waits for one permit, so a test can hold a job
/// in `processing` for as long as it needs.
#[derive(Clone)]
pub struct ScriptedSources {
    pub script: Arc<Script>,
    pub fps: f64,
    pub fail_open: bool,
    pub gate: Option<Arc<Semaphore>>,
    /// Set when an opened stream is dropped.
    pub stream_dropped: Arc<AtomicBool>,
}

impl ScriptedSources {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            fps: 30.0,
            fail_open: false,
            gate: None,
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn gated(script: Script) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let sources = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(script)
        };
        (sources, gate)
    }
}

#[async_trait]
impl FrameSourceOpener for ScriptedSources {
    async fn open(&self, source: &str) -> PipelineResult<Box<dyn FrameStream>> {
        if self.fail_open {
            return Err(PipelineError::SourceUnavailable(format!(
                "cannot open {source}"
            )));
        }
        let total = self.script.len() as u64;
        Ok(Box::new(ScriptedStream {
            info: VideoInfo::new(640, 480, self.fps, total, "mp4"),
            total,
            next: 0,
            gate: self.gate.clone(),
            dropped: Arc::clone(&self.stream_dropped),
        }))
    }
}

struct ScriptedStream {
    info: VideoInfo,
    total: u64,
    next: u64,
    gate: Option<Arc<Semaphore>>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        if self.next >= self.total {
            return Ok(None);
        }
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;
            permit.forget();
        }
        let frame = Frame {
            index: self.next,
            width: self.info.width,
            height: self.info.height,
            data: Vec::new(),
        };
        self.next += 1;
        Ok(Some(frame))
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Detector / tracker
// ---------------------------------------------------------------------------

/// Detector and tracker that replay the script.
#[derive(Clone)]
pub struct ScriptedEngine {
    pub script: Arc<Script>,
    pub fail_models: bool,
    pub fail_detect_at: Option<u64>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            fail_models: false,
            fail_detect_at: None,
        }
    }
}

#[async_trait]
impl AnalysisEngine for ScriptedEngine {
    async fn create_detector(
        &self,
        _parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Detector>> {
        if self.fail_models {
            return Err(PipelineError::ModelUnavailable("weights missing".into()));
        }
        Ok(Box::new(ScriptedDetector {
            script: Arc::clone(&self.script),
            fail_at: self.fail_detect_at,
        }))
    }

    async fn create_tracker(
        &self,
        _parameters: &AnalysisParameters,
    ) -> PipelineResult<Box<dyn Tracker>> {
        Ok(Box::new(ScriptedTracker {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedDetector {
    script: Arc<Script>,
    fail_at: Option<u64>,
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> PipelineResult<Vec<Detection>> {
        if self.fail_at == Some(frame.index) {
            return Err(PipelineError::Io(std::io::Error::other(
                "inference backend crashed",
            )));
        }
        Ok(objects_at(&self.script, frame.index)
            .iter()
            .map(|(_, bbox)| Detection::new(*bbox, 0.9, 0, "sperm"))
            .filter(|d| d.confidence >= confidence_threshold)
            .collect())
    }
}

struct ScriptedTracker {
    script: Arc<Script>,
}

#[async_trait]
impl Tracker for ScriptedTracker {
    async fn update(
        &mut self,
        frame: &Frame,
        _detections: &[Detection],
    ) -> PipelineResult<Vec<ConfirmedTrack>> {
        Ok(objects_at(&self.script, frame.index)
            .iter()
            .map(|(id, bbox)| ConfirmedTrack::new(*id, *bbox))
            .collect())
    }
}

fn objects_at(script: &Script, index: u64) -> &[(TrackId, BoundingBox)] {
    script
        .get(index as usize)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Recording job store
// ---------------------------------------------------------------------------

/// In-memory job store that records every written `(status, progress)`.
#[derive(Default)]
pub struct RecordingJobStore {
    inner: InMemoryJobStore,
    writes: Mutex<Vec<(JobId, JobStatus, u8)>>,
}

impl RecordingJobStore {
    fn record(&self, job: &Job) {
        self.writes
            .lock()
            .unwrap()
            .push((job.id, job.status, job.progress));
    }

    /// Every recorded `(status, progress)` for `id`, in write order.
    pub fn history(&self, id: JobId) -> Vec<(JobStatus, u8)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _, _)| *job_id == id)
            .map(|(_, status, progress)| (*status, *progress))
            .collect()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn insert(&self, job: Job) -> PipelineResult<()> {
        self.record(&job);
        self.inner.insert(job).await
    }

    async fn get(&self, id: JobId) -> PipelineResult<Option<Job>> {
        self.inner.get(id).await
    }

    async fn set(&self, job: Job) -> PipelineResult<()> {
        self.inner.set(job.clone()).await?;
        self.record(&job);
        Ok(())
    }

    async fn delete(&self, id: JobId) -> PipelineResult<Option<Job>> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> PipelineResult<Vec<Job>> {
        self.inner.list().await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: AnalysisService,
    pub jobs: Arc<RecordingJobStore>,
    pub reports: Arc<InMemoryReportStore>,
}

/// Config with progress published after every frame.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        progress_interval_frames: 1,
        ..PipelineConfig::default()
    }
}

pub fn start(engine: ScriptedEngine, sources: ScriptedSources) -> Harness {
    start_with(test_config(), engine, sources)
}

pub fn start_with(config: PipelineConfig, engine: ScriptedEngine, sources: ScriptedSources) -> Harness {
    let jobs = Arc::new(RecordingJobStore::default());
    let reports = Arc::new(InMemoryReportStore::new());
    let service = AnalysisService::start(
        &config,
        Arc::new(engine),
        Arc::new(sources),
        jobs.clone(),
        reports.clone(),
    );
    Harness {
        service,
        jobs,
        reports,
    }
}

/// Wait until `flag` is set, failing the test after a few seconds.
pub async fn wait_for_flag(flag: &AtomicBool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("flag was never set");
}
