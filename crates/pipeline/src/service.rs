//! Request-layer facade: submit, poll, fetch, delete, list.
//!
//! Every call returns promptly. Analysis runs on the task queue; callers
//! observe it through [`AnalysisService::status`] or the event bus.

use std::sync::Arc;
use std::time::Duration;

use motility_core::error::CoreError;
use motility_core::job::{Job, JobStatus};
use motility_core::params::{resolve_parameters, AnalysisParameters};
use motility_core::report::Report;
use motility_core::types::{JobId, Timestamp};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::PipelineConfig;
use crate::engine::{AnalysisEngine, FrameSourceOpener};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{JobEvent, JobEventBus};
use crate::lifecycle::JobLifecycle;
use crate::queue::TaskQueue;
use crate::report_store::ReportStore;
use crate::runner::{AnalysisTask, JobRunner};
use crate::store::JobStore;

/// What status polling returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub source: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub result_ref: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            source: job.source.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            result_ref: job.result_ref.clone(),
        }
    }
}

/// Entry point for the request layer.
pub struct AnalysisService {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    events: Arc<JobEventBus>,
    queue: Arc<TaskQueue>,
    defaults: AnalysisParameters,
}

impl AnalysisService {
    /// Wire the stores and collaborators together and start the queue.
    pub fn start(
        config: &PipelineConfig,
        engine: Arc<dyn AnalysisEngine>,
        sources: Arc<dyn FrameSourceOpener>,
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        let events = Arc::new(JobEventBus::default());
        let lifecycle = JobLifecycle::new(
            Arc::clone(&jobs),
            Arc::clone(&reports),
            Arc::clone(&events),
        );
        let runner = Arc::new(JobRunner::new(
            engine,
            sources,
            lifecycle,
            config.progress_interval_frames,
        ));
        let queue = TaskQueue::start(runner, config.max_concurrent_jobs, config.queue_capacity);

        Self {
            jobs,
            reports,
            events,
            queue,
            defaults: config.default_parameters.clone(),
        }
    }

    /// Subscribe to lifecycle events of every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Create a `pending` job for `source` and queue its analysis.
    ///
    /// Malformed parameters fall back to defaults where that is safe;
    /// out-of-range values are rejected and no job is created.
    pub async fn submit(&self, source: &str, raw_parameters: Option<&str>) -> PipelineResult<JobId> {
        let resolved = resolve_parameters(raw_parameters, &self.defaults).map_err(|e| match e {
            CoreError::Validation(msg) => PipelineError::InvalidParameters(msg),
            other => PipelineError::Core(other),
        })?;
        for warning in &resolved.warnings {
            tracing::warn!(source, warning = %warning, "Analysis parameters fell back to defaults");
        }

        let job = Job::new(source, resolved.parameters);
        let job_id = job.id;
        let task = AnalysisTask {
            job_id,
            source: job.source.clone(),
            parameters: job.parameters.clone(),
        };

        self.jobs.insert(job).await?;
        if let Err(e) = self.queue.enqueue(task).await {
            self.jobs.delete(job_id).await?;
            return Err(e);
        }

        self.events.publish(JobEvent::Queued { job_id });
        tracing::info!(job_id = %job_id, source, "Analysis job submitted");
        Ok(job_id)
    }

    /// Current state of a job. Never blocks on the analysis itself.
    pub async fn status(&self, id: JobId) -> PipelineResult<JobStatusView> {
        let job = self.load(id).await?;
        Ok(JobStatusView::from(&job))
    }

    /// The report of a completed job.
    pub async fn result(&self, id: JobId) -> PipelineResult<Arc<Report>> {
        let job = self.load(id).await?;
        match (job.status, job.result_ref.as_deref()) {
            (JobStatus::Completed, Some(result_ref)) => self.reports.load(result_ref).await,
            (status, _) => Err(PipelineError::NotReady { id, status }),
        }
    }

    /// Remove a job and its report, stopping its analysis if running.
    pub async fn delete(&self, id: JobId) -> PipelineResult<()> {
        let job = self
            .jobs
            .delete(id)
            .await?
            .ok_or(PipelineError::JobNotFound(id))?;

        let was_active = self.queue.cancel(id).await;
        if let Some(result_ref) = job.result_ref.as_deref() {
            self.reports.delete(result_ref).await?;
        }

        self.events.publish(JobEvent::Deleted { job_id: id });
        tracing::info!(job_id = %id, status = %job.status, was_active, "Analysis job deleted");
        Ok(())
    }

    /// Every known job, newest first.
    pub async fn list_jobs(&self) -> PipelineResult<Vec<JobStatusView>> {
        let mut jobs = self.jobs.list().await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs.iter().map(JobStatusView::from).collect())
    }

    /// Resolve once the job is `completed` or `failed`.
    ///
    /// `JobNotFound` if the job is (or gets) deleted.
    pub async fn wait_for_terminal(&self, id: JobId) -> PipelineResult<JobStatusView> {
        // Subscribe before reading so a transition in between is not missed.
        let mut rx = self.events.subscribe();
        loop {
            let view = self.status(id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }

            loop {
                match rx.recv().await {
                    Ok(event) if event.job_id() == id && event.is_final() => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(job_id = %id, skipped, "Event receiver lagged, re-reading status");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(PipelineError::Store("event bus closed".to_string()));
                    }
                }
            }
        }
    }

    /// Stop the queue, giving running jobs up to `timeout` to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.queue.shutdown(timeout).await;
    }

    async fn load(&self, id: JobId) -> PipelineResult<Job> {
        self.jobs
            .get(id)
            .await?
            .ok_or(PipelineError::JobNotFound(id))
    }
}
