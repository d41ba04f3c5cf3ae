//! Body tracking results

use crate::capture::Capture;
use crate::types::{Body, BodyId, Skeleton};
use image::GrayImage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct FrameInner {
    bodies: Vec<Body>,
    body_index_map: GrayImage,
    capture: Capture,
    device_timestamp: Duration,
    system_timestamp: Duration,
}

/// Tracking result for one capture
///
/// Immutable once built by a worker. Every handle is one reference:
/// [`BodyFrame::reference`] takes another, [`BodyFrame::release`] (or drop)
/// gives one back, and the frame and its capture are freed with the last one.
#[derive(Clone)]
pub struct BodyFrame {
    inner: Arc<FrameInner>,
}

impl BodyFrame {
    pub(crate) fn new(
        bodies: Vec<Body>,
        body_index_map: GrayImage,
        capture: Capture,
        system_timestamp: Duration,
    ) -> Self {
        let device_timestamp = capture.device_timestamp();
        Self {
            inner: Arc::new(FrameInner {
                bodies,
                body_index_map,
                capture,
                device_timestamp,
                system_timestamp,
            }),
        }
    }

    /// Take another reference to this frame
    pub fn reference(&self) -> Self {
        self.clone()
    }

    /// Give this reference back
    pub fn release(self) {
        drop(self)
    }

    /// Number of live references
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn body_count(&self) -> usize {
        self.inner.bodies.len()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.inner.bodies
    }

    pub fn body(&self, index: usize) -> Option<&Body> {
        self.inner.bodies.get(index)
    }

    /// Id of the body at `index`, [`BodyId::INVALID`] when out of range
    pub fn body_id(&self, index: usize) -> BodyId {
        self.body(index).map_or(BodyId::INVALID, |body| body.id)
    }

    pub fn skeleton(&self, index: usize) -> Option<&Skeleton> {
        self.body(index).map(|body| &body.skeleton)
    }

    /// Per-pixel body labels aligned with the depth image
    pub fn body_index_map(&self) -> &GrayImage {
        &self.inner.body_index_map
    }

    /// The capture this frame was computed from
    pub fn capture(&self) -> &Capture {
        &self.inner.capture
    }

    pub fn device_timestamp(&self) -> Duration {
        self.inner.device_timestamp
    }

    /// Host time the result was produced, since the Unix epoch
    pub fn system_timestamp(&self) -> Duration {
        self.inner.system_timestamp
    }
}

impl fmt::Debug for BodyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyFrame")
            .field("bodies", &self.body_count())
            .field("device_timestamp", &self.device_timestamp())
            .field("refs", &self.ref_count())
            .finish()
    }
}
