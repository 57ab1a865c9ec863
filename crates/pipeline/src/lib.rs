//! Asynchronous analysis pipeline.
//!
//! - [`engine`]: capability traits for the frame source, detector and
//!   tracker.
//! - [`orchestrator`]: the per-job frame loop.
//! - [`runner`] and [`queue`]: units of work and their scheduling.
//! - [`lifecycle`]: the completion callback that commits job states.
//! - [`store`] and [`report_store`]: job table and report persistence.
//! - [`service`]: the facade used by a request layer.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod queue;
pub mod report_store;
pub mod runner;
pub mod service;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use service::{AnalysisService, JobStatusView};
