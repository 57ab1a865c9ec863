//! Pure domain logic for video motility analysis.
//!
//! Nothing in this crate performs I/O or spawns tasks. It provides:
//!
//! - [`detection`]: detections and confirmed tracks as handed over by the
//!   external detector and tracker.
//! - [`trajectory`]: the per-job Trajectory Store.
//! - [`metrics`]: the Frame Metric Calculator.
//! - [`aggregation`]: the Track Aggregator.
//! - [`report`]: the Report Builder and report document types.
//! - [`job`]: the Job record and its state machine.
//! - [`params`]: analysis parameters with lenient resolution.

pub mod aggregation;
pub mod detection;
pub mod error;
pub mod job;
pub mod metrics;
pub mod params;
pub mod report;
pub mod stats;
pub mod threshold_validation;
pub mod trajectory;
pub mod types;

pub use error::CoreError;
