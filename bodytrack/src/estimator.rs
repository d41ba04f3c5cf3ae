/// Pose estimator interface used by the tracker's worker threads
///
/// The tracker never looks inside the model: it hands each capture to a
/// `PoseEstimator` and wraps whatever comes back into a frame. Each worker
/// thread owns its own estimator instance, created through an
/// `EstimatorFactory` when the tracker starts.
use crate::capture::Capture;
use crate::config::TrackerConfig;
use crate::types::{Body, Calibration, ProcessingMode, SensorOrientation, BODY_INDEX_MAP_BACKGROUND};
use image::{GrayImage, Luma};
use std::time::Duration;

/// Settings passed with every inference call
///
/// Temporal smoothing is not among them: the worker smooths estimator output
/// itself, so estimators must return unsmoothed poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub sensor_orientation: SensorOrientation,
    pub processing_mode: ProcessingMode,
    pub gpu_device_id: i32,
}

impl InferenceParams {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            sensor_orientation: config.sensor_orientation,
            processing_mode: config.processing_mode,
            gpu_device_id: config.gpu_device_id,
        }
    }
}

/// Raw output of one inference call
#[derive(Debug, Clone)]
pub struct Estimate {
    pub bodies: Vec<Body>,
    /// One label per depth pixel: index into `bodies`, or the background value
    pub body_index_map: GrayImage,
}

impl Estimate {
    pub fn new(bodies: Vec<Body>, body_index_map: GrayImage) -> Self {
        Self {
            bodies,
            body_index_map,
        }
    }

    /// No bodies, every pixel background
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            bodies: Vec::new(),
            body_index_map: GrayImage::from_pixel(width, height, Luma([BODY_INDEX_MAP_BACKGROUND])),
        }
    }
}

/// Common interface for pose estimation backends
pub trait PoseEstimator: Send {
    /// Estimate the skeletons visible in one capture
    fn estimate(
        &mut self,
        capture: &Capture,
        calibration: &Calibration,
        params: &InferenceParams,
    ) -> Result<Estimate, String>;

    /// Estimator name (for logging/debugging)
    fn name(&self) -> &str;
}

/// Creates one estimator per worker thread
pub trait EstimatorFactory: Send + Sync {
    fn create(
        &self,
        config: &TrackerConfig,
        calibration: &Calibration,
    ) -> Result<Box<dyn PoseEstimator>, String>;
}

impl<F> EstimatorFactory for F
where
    F: Fn(&TrackerConfig, &Calibration) -> Result<Box<dyn PoseEstimator>, String> + Send + Sync,
{
    fn create(
        &self,
        config: &TrackerConfig,
        calibration: &Calibration,
    ) -> Result<Box<dyn PoseEstimator>, String> {
        self(config, calibration)
    }
}

/// Estimator that never finds anybody
///
/// Produces an all-background body index map sized to the depth image.
/// An optional latency simulates the cost of a real model.
#[derive(Debug, Clone, Default)]
pub struct NullEstimator {
    latency: Option<Duration>,
}

impl NullEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
        }
    }

    /// Factory handing every worker its own `NullEstimator`
    pub fn factory(latency: Option<Duration>) -> NullEstimatorFactory {
        NullEstimatorFactory { latency }
    }
}

impl PoseEstimator for NullEstimator {
    fn estimate(
        &mut self,
        capture: &Capture,
        calibration: &Calibration,
        _params: &InferenceParams,
    ) -> Result<Estimate, String> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let (width, height) = capture
            .depth()
            .map(|depth| depth.dimensions())
            .unwrap_or_else(|| calibration.depth_resolution());
        Ok(Estimate::empty(width, height))
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullEstimatorFactory {
    latency: Option<Duration>,
}

impl EstimatorFactory for NullEstimatorFactory {
    fn create(
        &self,
        config: &TrackerConfig,
        _calibration: &Calibration,
    ) -> Result<Box<dyn PoseEstimator>, String> {
        log::info!(
            "Creating null estimator ({:?}, latency {:?})",
            config.processing_mode,
            self.latency
        );
        Ok(Box::new(NullEstimator {
            latency: self.latency,
        }))
    }
}
