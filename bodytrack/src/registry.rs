//! Process-wide single tracker discipline

use crate::error::{Result, TrackerError};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static GLOBAL: Lazy<Arc<TrackerRegistry>> = Lazy::new(|| Arc::new(TrackerRegistry::new()));

/// Tracks whether a tracker is alive; at most one slot can be held at a time
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    occupied: AtomicBool,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every tracker in this process
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Claim the slot; fails with `AlreadyExists` while another holder lives
    pub fn acquire(self: &Arc<Self>) -> Result<TrackerSlot> {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrackerError::AlreadyExists)?;
        Ok(TrackerSlot {
            registry: Arc::clone(self),
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

/// Held by a live tracker; frees the registry when dropped
#[derive(Debug)]
pub struct TrackerSlot {
    registry: Arc<TrackerRegistry>,
}

impl Drop for TrackerSlot {
    fn drop(&mut self) {
        self.registry.occupied.store(false, Ordering::Release);
    }
}
