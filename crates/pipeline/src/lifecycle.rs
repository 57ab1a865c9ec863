//! Commits job state transitions and announces them on the event bus.
//!
//! [`JobLifecycle::finish`] is the completion callback of a unit of work:
//! it persists the report and marks the job `completed`, or marks it
//! `failed` with the cause. A job deleted while it ran is left deleted.

use std::sync::Arc;

use async_trait::async_trait;
use motility_core::job::{frame_progress, Job};
use motility_core::report::Report;
use motility_core::types::JobId;

use crate::error::{PipelineError, PipelineResult};
use crate::events::{JobEvent, JobEventBus};
use crate::report_store::ReportStore;
use crate::store::JobStore;

/// Shared handles needed to move a job through its states.
#[derive(Clone)]
pub struct JobLifecycle {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    events: Arc<JobEventBus>,
}

impl JobLifecycle {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
        events: Arc<JobEventBus>,
    ) -> Self {
        Self {
            jobs,
            reports,
            events,
        }
    }

    /// Load, mutate and write back one job.
    async fn update<F>(&self, id: JobId, apply: F) -> PipelineResult<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), motility_core::CoreError>,
    {
        let mut job = self
            .jobs
            .get(id)
            .await?
            .ok_or(PipelineError::JobNotFound(id))?;
        apply(&mut job)?;
        self.jobs.set(job.clone()).await?;
        Ok(job)
    }

    /// `pending -> processing`.
    pub async fn begin(&self, id: JobId) -> PipelineResult<()> {
        self.update(id, Job::begin_processing).await?;
        self.events.publish(JobEvent::Started { job_id: id });
        tracing::info!(job_id = %id, "Analysis started");
        Ok(())
    }

    /// Record progress; the stored value never decreases.
    pub async fn progress(&self, id: JobId, percent: u8, message: String) -> PipelineResult<()> {
        let job = self
            .update(id, |job| job.record_progress(percent, message))
            .await?;
        self.events.publish(JobEvent::Progress {
            job_id: id,
            percent: job.progress,
            message: job.message,
        });
        Ok(())
    }

    /// Commit the outcome of a job's unit of work.
    ///
    /// Returns the terminal job, or `None` when the job no longer exists.
    pub async fn finish(
        &self,
        id: JobId,
        outcome: PipelineResult<Report>,
    ) -> PipelineResult<Option<Job>> {
        match outcome {
            Ok(report) => self.complete(id, report).await,
            Err(error) => self.fail(id, &error).await,
        }
    }

    async fn complete(&self, id: JobId, report: Report) -> PipelineResult<Option<Job>> {
        let result_ref = self.reports.save(&report).await?;

        let completed = {
            let result_ref = result_ref.clone();
            self.update(id, move |job| job.complete(result_ref)).await
        };
        match completed {
            Ok(job) => {
                tracing::info!(
                    job_id = %id,
                    frames = report.summary.total_frames,
                    tracks = report.tracks.len(),
                    result_ref = %result_ref,
                    "Analysis completed",
                );
                self.events.publish(JobEvent::Completed {
                    job_id: id,
                    result_ref,
                });
                Ok(Some(job))
            }
            Err(PipelineError::JobNotFound(_)) => {
                tracing::info!(job_id = %id, "Job deleted during analysis, discarding report");
                self.reports.delete(&result_ref).await?;
                Ok(None)
            }
            Err(e) => {
                // The report is orphaned if the job cannot record it.
                if let Err(cleanup) = self.reports.delete(&result_ref).await {
                    tracing::warn!(job_id = %id, error = %cleanup, "Failed to remove orphaned report");
                }
                Err(e)
            }
        }
    }

    async fn fail(&self, id: JobId, error: &PipelineError) -> PipelineResult<Option<Job>> {
        let cause = error.to_string();
        match self.update(id, |job| job.fail(&cause)).await {
            Ok(job) => {
                tracing::error!(job_id = %id, kind = error.kind(), error = %cause, "Analysis failed");
                self.events.publish(JobEvent::Failed {
                    job_id: id,
                    error: cause,
                });
                Ok(Some(job))
            }
            Err(PipelineError::JobNotFound(_)) => {
                tracing::info!(job_id = %id, kind = error.kind(), "Job deleted during analysis");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress sink
// ---------------------------------------------------------------------------

/// Receives frame-loop progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn frames_processed(&self, processed: u64, total: u64) -> PipelineResult<()>;
}

/// Publishes frame progress of one job through its lifecycle.
pub struct JobProgress {
    lifecycle: JobLifecycle,
    job_id: JobId,
}

impl JobProgress {
    pub fn new(lifecycle: JobLifecycle, job_id: JobId) -> Self {
        Self { lifecycle, job_id }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn frames_processed(&self, processed: u64, total: u64) -> PipelineResult<()> {
        // Unknown frame count: nothing meaningful to report.
        let Some(percent) = frame_progress(processed, total) else {
            return Ok(());
        };
        self.lifecycle
            .progress(
                self.job_id,
                percent,
                format!("Processing frame {processed} of {total}"),
            )
            .await
    }
}
