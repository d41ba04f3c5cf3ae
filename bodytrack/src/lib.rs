//! Body Tracking Pipeline
//!
//! Asynchronous body tracking over depth-sensor captures. Captures are queued
//! with [`Tracker::enqueue_capture`], worker threads run a pluggable
//! [`PoseEstimator`] on them, and reference-counted [`BodyFrame`] results are
//! collected with [`Tracker::pop_result`]. Every blocking call takes an
//! explicit [`Timeout`], and [`Tracker::shutdown`] releases all waiters.

pub mod capture;
pub mod config;
pub mod error;
pub mod estimator;
pub mod frame;
pub mod queue;
pub mod registry;
pub mod smoothing;
pub mod stats;
pub mod timeout;
pub mod tracker;
pub mod types;

mod worker;

pub use capture::{Capture, Image, Luma16Image};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use estimator::{
    Estimate, EstimatorFactory, InferenceParams, NullEstimator, NullEstimatorFactory,
    PoseEstimator,
};
pub use frame::BodyFrame;
pub use queue::{BoundedQueue, PopError, PushError};
pub use registry::TrackerRegistry;
pub use smoothing::TemporalSmoother;
pub use stats::TrackerStats;
pub use timeout::Timeout;
pub use tracker::{Tracker, TrackerState};
pub use types::{
    Body, BodyId, Calibration, DepthMode, Float3, ImageFormat, Joint, JointConfidenceLevel,
    JointType, ProcessingMode, Quaternion, SensorOrientation, Skeleton,
    BODY_INDEX_MAP_BACKGROUND, DEFAULT_TRACKER_SMOOTHING_FACTOR, MAX_TRACKING_QUEUE_SIZE,
};

/// Initialize the body tracking library
pub fn init() -> Result<()> {
    log::info!("Body tracking library {} initialized", version());
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
