use motility_core::error::CoreError;
use motility_core::job::JobStatus;
use motility_core::types::JobId;

/// Errors raised by the analysis pipeline.
///
/// The first four variants are the analysis failure taxonomy; all of them
/// end the job in `failed`. The rest describe request-level outcomes.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The frame source could not be opened or decoded.
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    /// The detector or tracker failed to initialize.
    #[error("Analysis model unavailable: {0}")]
    ModelUnavailable(String),

    /// Decoding, detection or tracking failed mid-stream.
    #[error("Frame {frame_index} failed: {reason}")]
    FrameFailure { frame_index: u64, reason: String },

    /// Parameters could not be used, rejected before the job exists.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// A result was requested before the job completed.
    #[error("Job {id} is not ready (status: {status})")]
    NotReady { id: JobId, status: JobStatus },

    #[error("Job cancelled")]
    Cancelled,

    /// The submission queue is full or no longer accepting work.
    #[error("Task queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Stable snake_case label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::FrameFailure { .. } => "frame_failure",
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::JobNotFound(_) => "job_not_found",
            Self::NotReady { .. } => "not_ready",
            Self::Cancelled => "cancelled",
            Self::QueueUnavailable(_) => "queue_unavailable",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Core(_) => "core",
        }
    }

    /// Wrap any error raised while opening a source as `SourceUnavailable`.
    pub fn into_source_unavailable(self) -> Self {
        match self {
            e @ Self::SourceUnavailable(_) => e,
            other => Self::SourceUnavailable(other.to_string()),
        }
    }

    /// Wrap any error raised while creating a model as `ModelUnavailable`.
    pub fn into_model_unavailable(self) -> Self {
        match self {
            e @ Self::ModelUnavailable(_) => e,
            other => Self::ModelUnavailable(other.to_string()),
        }
    }

    /// Attribute an error to `frame_index`, keeping existing attributions.
    pub fn at_frame(self, frame_index: u64) -> Self {
        match self {
            e @ (Self::FrameFailure { .. } | Self::Cancelled) => e,
            other => Self::FrameFailure {
                frame_index,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_attribution_is_kept() {
        let err = PipelineError::Store("disk".into()).at_frame(4);
        assert_eq!(err.kind(), "frame_failure");
        assert_eq!(err.to_string(), "Frame 4 failed: Store error: disk");

        let again = err.at_frame(9);
        assert!(matches!(again, PipelineError::FrameFailure { frame_index: 4, .. }));
    }

    #[test]
    fn cancellation_is_not_a_frame_failure() {
        assert!(matches!(PipelineError::Cancelled.at_frame(1), PipelineError::Cancelled));
    }

    #[test]
    fn open_errors_become_source_unavailable() {
        let err = PipelineError::Io(std::io::Error::other("missing")).into_source_unavailable();
        assert_eq!(err.kind(), "source_unavailable");
    }
}
