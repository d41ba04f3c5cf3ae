/// Worker threads that turn queued captures into body frames
///
/// Each worker:
/// - polls the input queue so it notices closure even while idle
/// - runs its own pose estimator and temporal smoother; an estimator error or
///   panic drops that capture and the worker carries on
/// - publishes frames to the output queue, waiting as long as it takes
///
/// A worker exits only once the input queue is closed and drained.
use crate::capture::Capture;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::estimator::{Estimate, InferenceParams, PoseEstimator};
use crate::frame::BodyFrame;
use crate::queue::{BoundedQueue, PopError};
use crate::smoothing::TemporalSmoother;
use crate::stats::PipelineCounters;
use crate::timeout::Timeout;
use crate::types::Calibration;
use crossbeam::atomic::AtomicCell;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// State shared between the tracker front end and its workers
pub(crate) struct Pipeline {
    pub input: BoundedQueue<Capture>,
    pub output: BoundedQueue<BodyFrame>,
    pub calibration: Calibration,
    pub config: TrackerConfig,
    pub smoothing: AtomicCell<f32>,
    /// Captures accepted and not yet popped as a result or dropped
    pub queued: AtomicUsize,
    pub counters: PipelineCounters,
}

impl Pipeline {
    pub fn new(calibration: Calibration, config: TrackerConfig) -> Self {
        Self {
            input: BoundedQueue::new(config.input_queue_capacity),
            output: BoundedQueue::new(config.output_queue_capacity),
            smoothing: AtomicCell::new(config.temporal_smoothing),
            calibration,
            config,
            queued: AtomicUsize::new(0),
            counters: PipelineCounters::default(),
        }
    }

    /// Forget one capture that will never reach `pop_result`
    pub fn forget_one(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Handle to one worker thread
pub(crate) struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        id: usize,
        pipeline: Arc<Pipeline>,
        estimator: Box<dyn PoseEstimator>,
    ) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("bodytrack-worker-{}", id))
            .spawn(move || run(id, &pipeline, estimator))?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the thread to finish; idempotent
    pub fn join(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread.join().map_err(|_| {
            log::error!("Body tracking worker {} panicked", self.id);
            TrackerError::WorkerPanicked(self.id)
        })
    }
}

fn run(id: usize, pipeline: &Pipeline, mut estimator: Box<dyn PoseEstimator>) {
    let poll = Timeout::After(pipeline.config.worker_poll_interval());
    let params = InferenceParams::from_config(&pipeline.config);
    let mut smoother = TemporalSmoother::new();
    let mut inference_time = Duration::ZERO;
    let mut frames = 0_u64;

    log::info!("Body tracking worker {} started ({})", id, estimator.name());

    loop {
        let capture = match pipeline.input.pop(poll) {
            Ok(capture) => capture,
            Err(PopError::Timeout) => continue,
            Err(PopError::Closed) => break,
        };

        // Nobody can receive the result any more
        if pipeline.output.is_closed() {
            log::debug!("Worker {}: output closed, skipping capture", id);
            PipelineCounters::bump(&pipeline.counters.frames_discarded);
            pipeline.forget_one();
            continue;
        }

        let start = Instant::now();
        let Estimate {
            mut bodies,
            body_index_map,
        } = match estimate(estimator.as_mut(), &capture, &pipeline.calibration, &params) {
            Ok(estimate) => estimate,
            Err(e) => {
                log::warn!("Worker {}: pose estimation failed: {}", id, e);
                PipelineCounters::bump(&pipeline.counters.inference_failures);
                pipeline.forget_one();
                continue;
            }
        };
        inference_time += start.elapsed();

        smoother.apply(&mut bodies, pipeline.smoothing.load());
        let frame = BodyFrame::new(bodies, body_index_map, capture, system_time());

        // Must be counted before any consumer can pop it
        PipelineCounters::bump(&pipeline.counters.frames_produced);
        if let Err(rejected) = pipeline.output.push(frame, Timeout::Infinite) {
            log::debug!("Worker {}: output closed, dropping frame", id);
            drop(rejected.into_inner());
            pipeline.counters.frames_produced.fetch_sub(1, Ordering::Relaxed);
            PipelineCounters::bump(&pipeline.counters.frames_discarded);
            pipeline.forget_one();
            continue;
        }
        frames += 1;

        // Log statistics every 100 frames
        if frames % 100 == 0 {
            log::info!(
                "Worker {} stats: {} frames, {:.1}ms avg inference | {}",
                id,
                frames,
                inference_time.as_secs_f32() * 1000.0 / frames as f32,
                pipeline.counters.snapshot()
            );
        }
    }

    log::info!("Body tracking worker {} stopped after {} frames", id, frames);
}

/// Run one inference, turning a panic into an ordinary failure
fn estimate(
    estimator: &mut dyn PoseEstimator,
    capture: &Capture,
    calibration: &Calibration,
    params: &InferenceParams,
) -> std::result::Result<Estimate, String> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        estimator.estimate(capture, calibration, params)
    }))
    .unwrap_or_else(|payload| Err(format!("estimator panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn system_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
