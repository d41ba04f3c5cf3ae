//! Wait policy for every blocking tracker and queue call

use std::fmt;
use std::time::{Duration, Instant};

/// How long a blocking call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// Check the status and return immediately
    #[default]
    NoWait,
    /// Wait at most the given duration
    After(Duration),
    /// Block until the operation completes or the queue is closed
    Infinite,
}

impl Timeout {
    pub fn from_millis(ms: u64) -> Self {
        Self::from(Duration::from_millis(ms))
    }

    pub fn is_no_wait(&self) -> bool {
        matches!(self, Self::NoWait)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// Absolute deadline counted from `now`, `None` when the wait is unbounded
    pub(crate) fn deadline_from(&self, now: Instant) -> Option<Instant> {
        match self {
            Self::NoWait => Some(now),
            // Durations too large to represent as an instant behave like Infinite
            Self::After(d) => now.checked_add(*d),
            Self::Infinite => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::NoWait
        } else {
            Self::After(d)
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWait => write!(f, "NoWait"),
            Self::After(d) => write!(f, "{}ms", d.as_millis()),
            Self::Infinite => write!(f, "Infinite"),
        }
    }
}
