//! Analysis parameters: defaults, lenient parsing, and validation.
//!
//! Parameters arrive from the request layer as an optional JSON string.
//! Anything malformed but harmless (not JSON at all, a missing field, a
//! field of the wrong type) falls back to the default and is reported as
//! a warning. Values that parse but are out of range are rejected so the
//! job is never created.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::threshold_validation::{validate_non_negative, validate_positive, validate_unit_range};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Detector confidence below which detections are discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Velocity (px/s) above which an object counts as motile.
pub const DEFAULT_MOTILITY_THRESHOLD: f64 = 20.0;

/// Frames a tracker identity survives without a matching detection.
pub const DEFAULT_MAX_TRACK_AGE: u32 = 50;

/// Upper bound on detections handed to the tracker per frame.
pub const DEFAULT_MAX_DETECTIONS: usize = 100;

/// Frame rate assumed when converting per-frame displacement to velocity.
pub const DEFAULT_ASSUMED_FPS: f64 = 30.0;

// ---------------------------------------------------------------------------
// AnalysisParameters
// ---------------------------------------------------------------------------

/// Tunables for a single analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    pub confidence_threshold: f64,
    pub motility_threshold: f64,
    pub max_track_age: u32,
    pub max_detections: usize,
    /// The velocity time step is `1 / assumed_fps`, independent of the
    /// video's real frame rate.
    pub assumed_fps: f64,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            motility_threshold: DEFAULT_MOTILITY_THRESHOLD,
            max_track_age: DEFAULT_MAX_TRACK_AGE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            assumed_fps: DEFAULT_ASSUMED_FPS,
        }
    }
}

impl AnalysisParameters {
    /// Seconds between consecutive frames used for instantaneous velocity.
    pub fn velocity_time_step(&self) -> f64 {
        1.0 / self.assumed_fps
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_unit_range(self.confidence_threshold, "confidence_threshold")?;
        validate_non_negative(self.motility_threshold, "motility_threshold")?;
        validate_positive(self.assumed_fps, "assumed_fps")?;
        if self.max_track_age == 0 {
            return Err(CoreError::Validation(
                "max_track_age must be greater than 0".to_string(),
            ));
        }
        if self.max_detections == 0 {
            return Err(CoreError::Validation(
                "max_detections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lenient resolution
// ---------------------------------------------------------------------------

/// Parameters after resolution, plus the fallbacks that were applied.
#[derive(Debug, Clone)]
pub struct ResolvedParameters {
    pub parameters: AnalysisParameters,
    pub warnings: Vec<String>,
}

/// Resolve raw request parameters against `defaults`.
///
/// `None` or an empty string yields the defaults with no warnings.
pub fn resolve_parameters(
    raw: Option<&str>,
    defaults: &AnalysisParameters,
) -> Result<ResolvedParameters, CoreError> {
    let mut warnings = Vec::new();
    let mut parameters = defaults.clone();

    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        parameters.validate()?;
        return Ok(ResolvedParameters { parameters, warnings });
    };

    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warnings.push("parameters must be a JSON object; using defaults".to_string());
            Map::new()
        }
        Err(e) => {
            warnings.push(format!("parameters are not valid JSON ({e}); using defaults"));
            Map::new()
        }
    };

    if let Some(v) = read_f64(&object, "confidence_threshold", &mut warnings) {
        parameters.confidence_threshold = v;
    }
    if let Some(v) = read_f64(&object, "motility_threshold", &mut warnings) {
        parameters.motility_threshold = v;
    }
    if let Some(v) = read_f64(&object, "assumed_fps", &mut warnings) {
        parameters.assumed_fps = v;
    }
    // `tracking_max_age` is the name older clients send.
    let age_key = if object.contains_key("max_track_age") {
        "max_track_age"
    } else {
        "tracking_max_age"
    };
    if let Some(v) = read_count(&object, age_key, &mut warnings)? {
        parameters.max_track_age = u32::try_from(v).map_err(|_| {
            CoreError::Validation(format!("{age_key} is too large, got {v}"))
        })?;
    }
    if let Some(v) = read_count(&object, "max_detections", &mut warnings)? {
        parameters.max_detections = usize::try_from(v).map_err(|_| {
            CoreError::Validation(format!("max_detections is too large, got {v}"))
        })?;
    }

    parameters.validate()?;
    Ok(ResolvedParameters { parameters, warnings })
}

fn read_f64(object: &Map<String, Value>, key: &str, warnings: &mut Vec<String>) -> Option<f64> {
    match object.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::Null => None,
        other => {
            warnings.push(format!("{key} must be a number, got {other}; using default"));
            None
        }
    }
}

/// Read a non-negative integer. A number that is not a non-negative
/// integer is an error, anything that is not a number is a warning.
fn read_count(
    object: &Map<String, Value>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Result<Option<u64>, CoreError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            CoreError::Validation(format!("{key} must be a non-negative integer, got {n}"))
        }),
        Some(other) => {
            warnings.push(format!("{key} must be an integer, got {other}; using default"));
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
