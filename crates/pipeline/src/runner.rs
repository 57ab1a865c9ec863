//! One job's unit of work, from model creation to the completion callback.

use std::sync::Arc;

use chrono::Utc;
use motility_core::job::{MAX_IN_FLIGHT_PROGRESS, MSG_BUILDING_REPORT};
use motility_core::params::AnalysisParameters;
use motility_core::report::{build_report, Report};
use motility_core::types::JobId;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::engine::{AnalysisEngine, FrameSourceOpener};
use crate::error::{PipelineError, PipelineResult};
use crate::lifecycle::{JobLifecycle, JobProgress};
use crate::orchestrator::AnalysisOrchestrator;

/// What the queue hands to the runner.
#[derive(Debug, Clone)]
pub struct AnalysisTask {
    pub job_id: JobId,
    pub source: String,
    pub parameters: AnalysisParameters,
}

/// Executes analysis tasks against the configured collaborators.
pub struct JobRunner {
    engine: Arc<dyn AnalysisEngine>,
    sources: Arc<dyn FrameSourceOpener>,
    lifecycle: JobLifecycle,
    progress_interval_frames: u64,
}

impl JobRunner {
    pub fn new(
        engine: Arc<dyn AnalysisEngine>,
        sources: Arc<dyn FrameSourceOpener>,
        lifecycle: JobLifecycle,
        progress_interval_frames: u64,
    ) -> Self {
        Self {
            engine,
            sources,
            lifecycle,
            progress_interval_frames,
        }
    }

    /// Run `task` to a terminal state.
    ///
    /// Never returns an error: every outcome goes through the lifecycle's
    /// completion callback.
    pub async fn run(&self, task: AnalysisTask, cancel: CancellationToken) {
        let span = tracing::info_span!("analysis_job", job_id = %task.job_id);
        async {
            let outcome = self.analyze(&task, &cancel).await;
            if let Err(e) = self.lifecycle.finish(task.job_id, outcome).await {
                tracing::error!(kind = e.kind(), error = %e, "Failed to record job outcome");
            }
        }
        .instrument(span)
        .await
    }

    /// Commit a task that will never run as cancelled.
    pub async fn abandon(&self, task: AnalysisTask) {
        if let Err(e) = self
            .lifecycle
            .finish(task.job_id, Err(PipelineError::Cancelled))
            .await
        {
            tracing::error!(job_id = %task.job_id, error = %e, "Failed to record abandoned job");
        }
    }

    async fn analyze(
        &self,
        task: &AnalysisTask,
        cancel: &CancellationToken,
    ) -> PipelineResult<Report> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let detector = self
            .engine
            .create_detector(&task.parameters)
            .await
            .map_err(PipelineError::into_model_unavailable)?;
        let tracker = self
            .engine
            .create_tracker(&task.parameters)
            .await
            .map_err(PipelineError::into_model_unavailable)?;

        let mut stream = self
            .sources
            .open(&task.source)
            .await
            .map_err(PipelineError::into_source_unavailable)?;

        self.lifecycle.begin(task.job_id).await?;

        let progress = JobProgress::new(self.lifecycle.clone(), task.job_id);
        let mut orchestrator = AnalysisOrchestrator::new(
            detector,
            tracker,
            task.parameters.clone(),
            self.progress_interval_frames,
        );
        let output = orchestrator
            .run(stream.as_mut(), &progress, cancel)
            .await?;

        self.lifecycle
            .progress(
                task.job_id,
                MAX_IN_FLIGHT_PROGRESS,
                MSG_BUILDING_REPORT.to_string(),
            )
            .await?;

        Ok(build_report(
            task.job_id,
            output.video_info,
            output.frames,
            &output.trajectories,
            task.parameters.clone(),
            Utc::now(),
        ))
    }
}
