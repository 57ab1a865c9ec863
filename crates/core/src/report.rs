//! Report Builder: assembles the final, immutable analysis report.
//!
//! The serialized field names match the result document consumers already
//! read (`summary`, `detections`, `tracks`, `time_series`, `statistics`,
//! ...). Summary percentages, velocities and duration are rounded to 2
//! decimal places; density values to 4. Per-frame metrics and track
//! analyses are kept at full precision.

use serde::{Deserialize, Serialize};

use crate::aggregation::{aggregate_tracks, TrackAnalysis};
use crate::metrics::FrameMetrics;
use crate::params::AnalysisParameters;
use crate::stats::{max, mean, min, round_to, std_dev};
use crate::trajectory::TrajectoryStore;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Decimal places for percentages, velocities, counts and durations.
pub const SUMMARY_PRECISION: u32 = 2;

/// Decimal places for density values.
pub const DENSITY_PRECISION: u32 = 4;

/// Motility percentage below this is "low".
pub const MOTILITY_LOW_BELOW: f64 = 30.0;
/// Motility percentage at or above this is "high".
pub const MOTILITY_HIGH_FROM: f64 = 70.0;

/// Mean frame velocity (px/s) below this is "slow".
pub const VELOCITY_SLOW_BELOW: f64 = 20.0;
/// Mean frame velocity (px/s) at or above this is "fast".
pub const VELOCITY_FAST_FROM: f64 = 50.0;

// ---------------------------------------------------------------------------
// Video info
// ---------------------------------------------------------------------------

/// Source metadata reported by the frame source at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Seconds, `total_frames / fps` (0 if fps is 0).
    pub duration: f64,
    /// Frame count from the container metadata; may differ from the
    /// number of frames actually decoded.
    pub total_frames: u64,
    pub format: String,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, fps: f64, total_frames: u64, format: impl Into<String>) -> Self {
        let duration = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        Self {
            width,
            height,
            fps,
            duration,
            total_frames,
            format: format.into(),
        }
    }

    /// Video time of frame `index`, 0 when the frame rate is unknown.
    pub fn frame_time(&self, index: u64) -> f64 {
        if self.fps > 0.0 {
            index as f64 / self.fps
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Frame results
// ---------------------------------------------------------------------------

/// One processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_number: u64,
    pub timestamp: f64,
    #[serde(rename = "detections")]
    pub detection_count: usize,
    #[serde(rename = "tracks")]
    pub track_count: usize,
    pub metrics: FrameMetrics,
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Distinct identities ever recorded, including single-sample ones.
    pub total_sperm_detected: usize,
    pub max_concurrent_sperm: usize,
    pub average_sperm_count: f64,
    pub average_motility_percentage: f64,
    pub max_motility_percentage: f64,
    pub average_velocity: f64,
    pub max_velocity: f64,
    pub average_density: f64,
    pub max_density: f64,
    pub video_duration: f64,
    /// Frames actually processed.
    pub total_frames: usize,
    pub fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time: f64,
    pub sperm_count: usize,
    pub motility: f64,
    pub velocity: f64,
    pub density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotilityDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VelocityDistribution {
    pub slow: usize,
    pub medium: usize,
    pub fast: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DensityStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub motility_distribution: MotilityDistribution,
    pub velocity_distribution: VelocityDistribution,
    pub density_statistics: DensityStatistics,
}

/// Final output of one completed analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub analysis_id: JobId,
    pub video_info: VideoInfo,
    pub summary: ReportSummary,
    #[serde(rename = "detections")]
    pub frames: Vec<FrameResult>,
    pub tracks: Vec<TrackAnalysis>,
    pub time_series: Vec<TimeSeriesPoint>,
    pub statistics: Statistics,
    pub parameters: AnalysisParameters,
    #[serde(rename = "timestamp")]
    pub completed_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

pub fn motility_distribution(percentages: &[f64]) -> MotilityDistribution {
    let mut dist = MotilityDistribution::default();
    for &p in percentages {
        if p < MOTILITY_LOW_BELOW {
            dist.low += 1;
        } else if p < MOTILITY_HIGH_FROM {
            dist.medium += 1;
        } else {
            dist.high += 1;
        }
    }
    dist
}

pub fn velocity_distribution(velocities: &[f64]) -> VelocityDistribution {
    let mut dist = VelocityDistribution::default();
    for &v in velocities {
        if v < VELOCITY_SLOW_BELOW {
            dist.slow += 1;
        } else if v < VELOCITY_FAST_FROM {
            dist.medium += 1;
        } else {
            dist.fast += 1;
        }
    }
    dist
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assemble the report from the frame sequence and the trajectory store.
///
/// Track analyses are derived here, using the video's real frame rate for
/// durations and the job's motility threshold for the motile flag.
pub fn build_report(
    analysis_id: JobId,
    video_info: VideoInfo,
    frames: Vec<FrameResult>,
    store: &TrajectoryStore,
    parameters: AnalysisParameters,
    completed_at: Timestamp,
) -> Report {
    let tracks = aggregate_tracks(store, video_info.fps, parameters.motility_threshold);

    let counts: Vec<f64> = frames.iter().map(|f| f.metrics.active_sperm as f64).collect();
    let motility: Vec<f64> = frames.iter().map(|f| f.metrics.motility_percentage).collect();
    let velocity: Vec<f64> = frames.iter().map(|f| f.metrics.average_velocity).collect();
    let density: Vec<f64> = frames.iter().map(|f| f.metrics.density).collect();

    let summary = ReportSummary {
        total_sperm_detected: store.identity_count(),
        max_concurrent_sperm: frames
            .iter()
            .map(|f| f.metrics.active_sperm)
            .max()
            .unwrap_or(0),
        average_sperm_count: round_to(mean(&counts), SUMMARY_PRECISION),
        average_motility_percentage: round_to(mean(&motility), SUMMARY_PRECISION),
        max_motility_percentage: round_to(max(&motility), SUMMARY_PRECISION),
        average_velocity: round_to(mean(&velocity), SUMMARY_PRECISION),
        max_velocity: round_to(max(&velocity), SUMMARY_PRECISION),
        average_density: round_to(mean(&density), DENSITY_PRECISION),
        max_density: round_to(max(&density), DENSITY_PRECISION),
        video_duration: round_to(video_info.duration, SUMMARY_PRECISION),
        total_frames: frames.len(),
        fps: video_info.fps,
    };

    let time_series = frames
        .iter()
        .enumerate()
        .map(|(i, f)| TimeSeriesPoint {
            time: video_info.frame_time(i as u64),
            sperm_count: f.metrics.active_sperm,
            motility: f.metrics.motility_percentage,
            velocity: f.metrics.average_velocity,
            density: f.metrics.density,
        })
        .collect();

    let statistics = Statistics {
        motility_distribution: motility_distribution(&motility),
        velocity_distribution: velocity_distribution(&velocity),
        density_statistics: DensityStatistics {
            min: round_to(min(&density), DENSITY_PRECISION),
            max: round_to(max(&density), DENSITY_PRECISION),
            mean: round_to(mean(&density), DENSITY_PRECISION),
            std: round_to(std_dev(&density), DENSITY_PRECISION),
        },
    };

    Report {
        analysis_id,
        video_info,
        summary,
        frames,
        tracks,
        time_series,
        statistics,
        parameters,
        completed_at,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
