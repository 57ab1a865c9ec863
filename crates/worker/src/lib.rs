//! Standalone analysis worker.
//!
//! - [`replay`]: a fixture-driven frame source, detector and tracker.
//! - [`telemetry`]: tracing subscriber setup shared by the binary.

pub mod replay;
pub mod telemetry;
