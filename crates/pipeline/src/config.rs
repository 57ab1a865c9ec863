use std::path::PathBuf;
use std::str::FromStr;

use motility_core::params::{
    AnalysisParameters, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_TRACK_AGE,
    DEFAULT_MOTILITY_THRESHOLD,
};

/// Default number of jobs analysed at the same time.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Default length of the bounded submission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of frames between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL_FRAMES: u64 = 30;

/// Default directory for persisted reports.
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Pipeline configuration loaded from environment variables.
///
/// All fields have defaults suitable for local runs. A malformed value is
/// logged and replaced by its default rather than aborting startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs running simultaneously in this process.
    pub max_concurrent_jobs: usize,
    /// Submissions waiting for a free slot before `submit` is rejected.
    pub queue_capacity: usize,
    /// Publish frame progress every N processed frames.
    pub progress_interval_frames: u64,
    /// Where `JsonReportStore` writes `<job_id>_results.json`.
    pub results_dir: PathBuf,
    /// Parameters used when a submission does not override them.
    pub default_parameters: AnalysisParameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_interval_frames: DEFAULT_PROGRESS_INTERVAL_FRAMES,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            default_parameters: AnalysisParameters::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default   |
    /// |-------------------------------------|-----------|
    /// | `ANALYSIS_MAX_CONCURRENT_JOBS`      | `2`       |
    /// | `ANALYSIS_QUEUE_CAPACITY`           | `64`      |
    /// | `ANALYSIS_PROGRESS_INTERVAL_FRAMES` | `30`      |
    /// | `ANALYSIS_RESULTS_DIR`              | `results` |
    /// | `ANALYSIS_CONFIDENCE_THRESHOLD`     | `0.5`     |
    /// | `ANALYSIS_MOTILITY_THRESHOLD`       | `20.0`    |
    /// | `ANALYSIS_MAX_TRACK_AGE`            | `50`      |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_concurrent_jobs = non_zero(
            parse_or(&lookup, "ANALYSIS_MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS),
            "ANALYSIS_MAX_CONCURRENT_JOBS",
            DEFAULT_MAX_CONCURRENT_JOBS,
        );
        let queue_capacity = non_zero(
            parse_or(&lookup, "ANALYSIS_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            "ANALYSIS_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
        );
        let progress_interval_frames = non_zero(
            parse_or(
                &lookup,
                "ANALYSIS_PROGRESS_INTERVAL_FRAMES",
                DEFAULT_PROGRESS_INTERVAL_FRAMES,
            ),
            "ANALYSIS_PROGRESS_INTERVAL_FRAMES",
            DEFAULT_PROGRESS_INTERVAL_FRAMES,
        );

        let results_dir = lookup("ANALYSIS_RESULTS_DIR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR));

        let mut default_parameters = AnalysisParameters {
            confidence_threshold: parse_or(
                &lookup,
                "ANALYSIS_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            motility_threshold: parse_or(
                &lookup,
                "ANALYSIS_MOTILITY_THRESHOLD",
                DEFAULT_MOTILITY_THRESHOLD,
            ),
            max_track_age: parse_or(&lookup, "ANALYSIS_MAX_TRACK_AGE", DEFAULT_MAX_TRACK_AGE),
            ..AnalysisParameters::default()
        };
        if let Err(e) = default_parameters.validate() {
            tracing::warn!(error = %e, "Invalid default analysis parameters, using built-in defaults");
            default_parameters = AnalysisParameters::default();
        }

        Self {
            max_concurrent_jobs,
            queue_capacity,
            progress_interval_frames,
            results_dir,
            default_parameters,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Malformed config value, using default");
                default
            }
        },
    }
}

fn non_zero<T>(value: T, key: &str, default: T) -> T
where
    T: PartialEq + Default + std::fmt::Display,
{
    if value == T::default() {
        tracing::warn!(key, default = %default, "Config value must be greater than 0, using default");
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> PipelineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.progress_interval_frames, DEFAULT_PROGRESS_INTERVAL_FRAMES);
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.default_parameters, AnalysisParameters::default());
    }

    #[test]
    fn values_are_parsed() {
        let config = config_from(&[
            ("ANALYSIS_MAX_CONCURRENT_JOBS", "4"),
            ("ANALYSIS_PROGRESS_INTERVAL_FRAMES", " 10 "),
            ("ANALYSIS_RESULTS_DIR", "/tmp/reports"),
            ("ANALYSIS_MOTILITY_THRESHOLD", "25.5"),
            ("ANALYSIS_MAX_TRACK_AGE", "12"),
        ]);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.progress_interval_frames, 10);
        assert_eq!(config.results_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.default_parameters.motility_threshold, 25.5);
        assert_eq!(config.default_parameters.max_track_age, 12);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = config_from(&[
            ("ANALYSIS_QUEUE_CAPACITY", "lots"),
            ("ANALYSIS_MAX_CONCURRENT_JOBS", "0"),
        ]);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
    }

    #[test]
    fn out_of_range_parameters_fall_back() {
        let config = config_from(&[("ANALYSIS_CONFIDENCE_THRESHOLD", "3.0")]);
        assert_eq!(config.default_parameters, AnalysisParameters::default());
    }
}
