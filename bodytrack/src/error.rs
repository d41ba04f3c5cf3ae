//! Error types for the body tracking pipeline

use crate::types::{DepthMode, ProcessingMode};
use thiserror::Error;

/// Result type alias for the body tracking library
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur while creating or driving a tracker
///
/// [`TrackerError::Timeout`] is not a failure: it only means the wait elapsed
/// before the queue could accept or deliver an item, and the call may be retried.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("A body tracker already exists in this process")]
    AlreadyExists,

    #[error("Depth mode {0:?} carries no depth data")]
    NoDepthMode(DepthMode),

    #[error("Processing mode {0:?} is not supported on this platform")]
    UnsupportedProcessingMode(ProcessingMode),

    #[error("Invalid model path: {0}")]
    ModelPath(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Backend initialization failed: {0}")]
    BackendError(String),

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("Timed out waiting on the tracker queue")]
    Timeout,

    #[error("Tracker has been shut down")]
    Shutdown,

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::BackendError(msg.into())
    }

    pub fn model_path<S: Into<String>>(msg: S) -> Self {
        Self::ModelPath(msg.into())
    }

    pub fn invalid_capture<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCapture(msg.into())
    }

    /// The wait elapsed; retrying is allowed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// The tracker is done and will not accept or produce anything more
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
