//! Temporal smoothing of joint positions and orientations across frames

use crate::types::{Body, BodyId, Skeleton};
use std::collections::HashMap;

/// Blends each body's skeleton with the previous result for the same body id
///
/// A factor of 0 leaves estimates untouched, 1 freezes a body at the first
/// pose seen. Bodies missing from a frame are forgotten, so a body that
/// reappears starts fresh.
#[derive(Debug, Default)]
pub struct TemporalSmoother {
    previous: HashMap<BodyId, Skeleton>,
}

impl TemporalSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooth `bodies` in place and remember the result for the next frame
    pub fn apply(&mut self, bodies: &mut [Body], factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        let mut current = HashMap::with_capacity(bodies.len());

        for body in bodies.iter_mut().filter(|body| body.id.is_valid()) {
            if let Some(prev) = self.previous.get(&body.id) {
                if factor > 0.0 {
                    blend(&mut body.skeleton, prev, factor);
                }
            }
            current.insert(body.id, body.skeleton);
        }

        self.previous = current;
    }

    /// Number of bodies remembered from the last frame
    pub fn tracked_bodies(&self) -> usize {
        self.previous.len()
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

fn blend(skeleton: &mut Skeleton, prev: &Skeleton, factor: f32) {
    for (joint, (_, old)) in skeleton.joints_mut().iter_mut().zip(prev.iter()) {
        joint.position = joint.position.lerp(&old.position, factor);
        joint.orientation = joint.orientation.nlerp(&old.orientation, factor);
    }
}
