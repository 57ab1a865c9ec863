//! Job lifecycle events over a `tokio::sync::broadcast` channel.
//!
//! A request layer subscribes to push live updates to clients; the
//! service itself uses the bus to wait for terminal states.

use motility_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Job accepted and waiting for a free slot.
pub const MSG_TYPE_JOB_QUEUED: &str = "job_queued";

/// Frame source opened, frames are being consumed.
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// Progress update during analysis (percentage + message).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Report persisted, job completed.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job and its artifacts were deleted.
pub const MSG_TYPE_JOB_DELETED: &str = "job_deleted";

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    #[serde(rename = "job_queued")]
    Queued { job_id: JobId },
    #[serde(rename = "job_started")]
    Started { job_id: JobId },
    #[serde(rename = "job_progress")]
    Progress {
        job_id: JobId,
        percent: u8,
        message: String,
    },
    #[serde(rename = "job_completed")]
    Completed { job_id: JobId, result_ref: String },
    #[serde(rename = "job_failed")]
    Failed { job_id: JobId, error: String },
    #[serde(rename = "job_deleted")]
    Deleted { job_id: JobId },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id }
            | Self::Started { job_id }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Deleted { job_id } => *job_id,
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Queued { .. } => MSG_TYPE_JOB_QUEUED,
            Self::Started { .. } => MSG_TYPE_JOB_STARTED,
            Self::Progress { .. } => MSG_TYPE_JOB_PROGRESS,
            Self::Completed { .. } => MSG_TYPE_JOB_COMPLETED,
            Self::Failed { .. } => MSG_TYPE_JOB_FAILED,
            Self::Deleted { .. } => MSG_TYPE_JOB_DELETED,
        }
    }

    /// True for events after which the job will never change again.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Deleted { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out of [`JobEvent`]s to any number of subscribers.
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
