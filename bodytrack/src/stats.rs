//! Pipeline counters shared by the tracker and its workers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics from any thread
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub captures_enqueued: AtomicU64,
    pub frames_produced: AtomicU64,
    pub inference_failures: AtomicU64,
    pub frames_discarded: AtomicU64,
    pub results_popped: AtomicU64,
}

impl PipelineCounters {
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            captures_enqueued: self.captures_enqueued.load(Ordering::Relaxed),
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            results_popped: self.results_popped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Captures accepted by `enqueue_capture`
    pub captures_enqueued: u64,
    /// Frames published to the output queue, counted just before publishing
    pub frames_produced: u64,
    /// Captures dropped because the estimator failed
    pub inference_failures: u64,
    /// Captures or frames dropped because the output queue was closed
    pub frames_discarded: u64,
    /// Frames handed out by `pop_result`
    pub results_popped: u64,
}

impl TrackerStats {
    /// Captures accepted but not yet accounted for by a produced frame or a drop
    pub fn in_flight(&self) -> u64 {
        self.captures_enqueued.saturating_sub(
            self.frames_produced + self.inference_failures + self.frames_discarded,
        )
    }

    pub fn failure_rate(&self) -> f32 {
        let processed = self.frames_produced + self.inference_failures;
        if processed == 0 {
            return 0.0;
        }
        self.inference_failures as f32 / processed as f32
    }
}

impl fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} enqueued, {} produced, {} popped, {} failed ({:.1}%), {} discarded",
            self.captures_enqueued,
            self.frames_produced,
            self.results_popped,
            self.inference_failures,
            self.failure_rate() * 100.0,
            self.frames_discarded
        )
    }
}
