//! Tracker configuration

use crate::error::{Result, TrackerError};
use crate::types::{
    Calibration, ProcessingMode, SensorOrientation, DEFAULT_TRACKER_SMOOTHING_FACTOR,
    MAX_TRACKING_QUEUE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest output queue the tracker accepts
pub const MIN_OUTPUT_QUEUE_CAPACITY: usize = 3;

/// Configuration for a body tracker
///
/// Fixed for the lifetime of the tracker it creates. Missing fields in a
/// JSON document take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How the sensor is mounted
    pub sensor_orientation: SensorOrientation,

    /// Backend the pose estimator should run on
    pub processing_mode: ProcessingMode,

    /// GPU device ID (for multi-GPU systems)
    pub gpu_device_id: i32,

    /// Model file; `None` lets the estimator use its bundled model
    pub model_path: Option<PathBuf>,

    /// Captures waiting for inference
    pub input_queue_capacity: usize,

    /// Frames waiting to be popped (at least 3)
    pub output_queue_capacity: usize,

    /// Worker threads; results keep capture order only with one
    pub worker_count: usize,

    /// How long an idle worker waits on the input queue before re-checking
    pub worker_poll_interval_ms: u64,

    /// Smoothing factor in effect when the tracker starts
    pub temporal_smoothing: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sensor_orientation: SensorOrientation::Default,
            processing_mode: ProcessingMode::default(),
            gpu_device_id: 0,
            model_path: None,
            input_queue_capacity: MAX_TRACKING_QUEUE_SIZE,
            output_queue_capacity: MIN_OUTPUT_QUEUE_CAPACITY,
            worker_count: 1,
            worker_poll_interval_ms: 100,
            temporal_smoothing: DEFAULT_TRACKER_SMOOTHING_FACTOR,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    /// Model path to hand to the estimator; blank paths count as unset
    pub fn effective_model_path(&self) -> Option<&Path> {
        self.model_path
            .as_deref()
            .filter(|path| !path.as_os_str().to_string_lossy().trim().is_empty())
    }

    /// Static checks run by tracker creation before anything is allocated
    pub fn validate(&self, calibration: &Calibration) -> Result<()> {
        if !calibration.depth_mode.has_depth() {
            return Err(TrackerError::NoDepthMode(calibration.depth_mode));
        }

        if !self.processing_mode.is_supported() {
            return Err(TrackerError::UnsupportedProcessingMode(self.processing_mode));
        }

        if let Some(path) = self.effective_model_path() {
            validate_model_path(path)?;
        }

        if self.input_queue_capacity == 0 {
            return Err(TrackerError::config("input_queue_capacity must be at least 1"));
        }

        if self.output_queue_capacity < MIN_OUTPUT_QUEUE_CAPACITY {
            return Err(TrackerError::config(format!(
                "output_queue_capacity must be at least {}, got {}",
                MIN_OUTPUT_QUEUE_CAPACITY, self.output_queue_capacity
            )));
        }

        if self.worker_count == 0 {
            return Err(TrackerError::config("worker_count must be at least 1"));
        }

        if self.worker_poll_interval_ms == 0 {
            return Err(TrackerError::config("worker_poll_interval_ms must be positive"));
        }

        if !(0.0..=1.0).contains(&self.temporal_smoothing) {
            return Err(TrackerError::config(format!(
                "temporal_smoothing must be in [0, 1], got {}",
                self.temporal_smoothing
            )));
        }

        Ok(())
    }
}

fn validate_model_path(path: &Path) -> Result<()> {
    let text = path
        .to_str()
        .ok_or_else(|| TrackerError::model_path(format!("{:?} is not valid UTF-8", path)))?;

    if !text.is_ascii() || text.chars().any(|c| c.is_ascii_control()) {
        return Err(TrackerError::model_path(format!(
            "\"{}\" contains invalid or unsupported characters",
            text
        )));
    }

    if !path.is_file() {
        return Err(TrackerError::model_path(format!("\"{}\" does not exist", text)));
    }

    Ok(())
}
