//! Job record and its state machine.
//!
//! `pending -> processing -> {completed | failed}`. A job may also fail
//! straight from `pending` when its source or models cannot be opened.
//! Terminal states accept no further transitions, progress included.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::params::AnalysisParameters;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub const MSG_QUEUED: &str = "Video received, analysis queued";
pub const MSG_ANALYZING: &str = "Analyzing video";
pub const MSG_BUILDING_REPORT: &str = "Building report";
pub const MSG_COMPLETED: &str = "Analysis completed successfully";

/// Progress never reaches this value before the job is completed.
pub const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Failed],
            Self::Processing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    fn validate_transition(self, to: JobStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid transition: {} -> {}",
                self.as_str(),
                to.as_str()
            )))
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0-100, non-decreasing. 100 only once completed.
    pub progress: u8,
    pub message: String,
    /// Reference to the source video, opaque to the core.
    pub source: String,
    pub parameters: AnalysisParameters,
    /// Set on completion: where the report was persisted.
    pub result_ref: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// A fresh `pending` job with a new identity.
    pub fn new(source: impl Into<String>, parameters: AnalysisParameters) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: 0,
            message: MSG_QUEUED.to_string(),
            source: source.into(),
            parameters,
            result_ref: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// `pending -> processing`.
    pub fn begin_processing(&mut self) -> Result<(), CoreError> {
        self.status.validate_transition(JobStatus::Processing)?;
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.message = MSG_ANALYZING.to_string();
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Publish progress while processing.
    ///
    /// The value is clamped to [`MAX_IN_FLIGHT_PROGRESS`] and never moves
    /// backwards; a lower value only updates the message.
    pub fn record_progress(&mut self, progress: u8, message: impl Into<String>) -> Result<(), CoreError> {
        if self.status != JobStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Cannot record progress for a {} job",
                self.status
            )));
        }
        self.progress = self.progress.max(progress.min(MAX_IN_FLIGHT_PROGRESS));
        self.message = message.into();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `processing -> completed`, after the report has been persisted.
    pub fn complete(&mut self, result_ref: impl Into<String>) -> Result<(), CoreError> {
        self.status.validate_transition(JobStatus::Completed)?;
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = MSG_COMPLETED.to_string();
        self.result_ref = Some(result_ref.into());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `{pending | processing} -> failed`, carrying the cause.
    pub fn fail(&mut self, cause: &str) -> Result<(), CoreError> {
        self.status.validate_transition(JobStatus::Failed)?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.message = format!("Analysis failed: {cause}");
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// Progress percentage for `processed` of `total` frames, capped at
/// [`MAX_IN_FLIGHT_PROGRESS`]. `None` when the total is unknown.
pub fn frame_progress(processed: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (processed as f64 / total as f64 * 100.0).round();
    Some(pct.min(MAX_IN_FLIGHT_PROGRESS as f64) as u8)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
