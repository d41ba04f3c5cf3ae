/// Body tracker: captures in, body frames out
///
/// Callers push captures with [`Tracker::enqueue_capture`] and pull results
/// with [`Tracker::pop_result`], from as many threads as they like. Worker
/// threads run pose estimation in between. Only one tracker may be alive per
/// process.
///
/// Lifecycle: `Created -> Running -> ShuttingDown -> Destroyed`.
/// [`Tracker::shutdown`] closes both queues and wakes every blocked caller;
/// [`Tracker::destroy`] (or drop) also joins the workers and frees the
/// process-wide slot.
use crate::capture::Capture;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::estimator::EstimatorFactory;
use crate::frame::BodyFrame;
use crate::queue::{PopError, PushError};
use crate::registry::{TrackerRegistry, TrackerSlot};
use crate::stats::{PipelineCounters, TrackerStats};
use crate::timeout::Timeout;
use crate::types::{Calibration, DEFAULT_TRACKER_SMOOTHING_FACTOR};
use crate::worker::{Pipeline, Worker};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackerState {
    Created,
    Running,
    ShuttingDown,
    Destroyed,
}

impl TrackerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Destroyed,
        }
    }
}

pub struct Tracker {
    pipeline: Arc<Pipeline>,
    workers: Vec<Worker>,
    state: AtomicU8,
    slot: Option<TrackerSlot>,
}

impl Tracker {
    /// Create the process's tracker
    ///
    /// Fails with [`TrackerError::AlreadyExists`] while another tracker is alive.
    pub fn create<F>(calibration: Calibration, config: TrackerConfig, factory: &F) -> Result<Self>
    where
        F: EstimatorFactory + ?Sized,
    {
        Self::create_with_registry(&TrackerRegistry::global(), calibration, config, factory)
    }

    /// Create a tracker whose single-instance check uses `registry`
    pub fn create_with_registry<F>(
        registry: &Arc<TrackerRegistry>,
        calibration: Calibration,
        config: TrackerConfig,
        factory: &F,
    ) -> Result<Self>
    where
        F: EstimatorFactory + ?Sized,
    {
        config.validate(&calibration)?;
        let slot = registry.acquire()?;

        let estimators = (0..config.worker_count)
            .map(|_| factory.create(&config, &calibration))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(TrackerError::backend)?;

        log::info!(
            "Creating body tracker: {:?} {}x{}, {:?}, {} worker(s), queues {}/{}",
            calibration.depth_mode,
            calibration.depth_mode.width_pixels(),
            calibration.depth_mode.height_pixels(),
            config.processing_mode,
            config.worker_count,
            config.input_queue_capacity,
            config.output_queue_capacity
        );

        let pipeline = Arc::new(Pipeline::new(calibration, config));
        let mut tracker = Self {
            pipeline,
            workers: Vec::with_capacity(estimators.len()),
            state: AtomicU8::new(TrackerState::Created as u8),
            slot: Some(slot),
        };

        for (id, estimator) in estimators.into_iter().enumerate() {
            // On failure, dropping `tracker` stops and joins what was started
            let worker = Worker::spawn(id, Arc::clone(&tracker.pipeline), estimator)?;
            tracker.workers.push(worker);
        }

        tracker.set_state(TrackerState::Running);
        log::info!("Body tracker running");
        Ok(tracker)
    }

    pub fn state(&self) -> TrackerState {
        TrackerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TrackerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_shut_down(&self) -> bool {
        self.state() >= TrackerState::ShuttingDown
    }

    pub fn calibration(&self) -> &Calibration {
        &self.pipeline.calibration
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.pipeline.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submit a capture for tracking
    ///
    /// The tracker keeps its own reference; the caller's handle stays valid.
    /// Returns [`TrackerError::Timeout`] if the input queue stayed full for the
    /// whole wait and [`TrackerError::Shutdown`] once the tracker is shut down.
    pub fn enqueue_capture(&self, capture: &Capture, timeout: Timeout) -> Result<()> {
        if self.is_shut_down() {
            return Err(TrackerError::Shutdown);
        }
        capture.validate_for(&self.pipeline.calibration)?;

        // Count first so a fast consumer never sees the pop before the push
        self.pipeline.queued.fetch_add(1, Ordering::AcqRel);
        match self.pipeline.input.push(capture.clone(), timeout) {
            Ok(()) => {
                PipelineCounters::bump(&self.pipeline.counters.captures_enqueued);
                Ok(())
            }
            Err(err) => {
                self.pipeline.forget_one();
                match err {
                    PushError::Timeout(_) => Err(TrackerError::Timeout),
                    PushError::Closed(_) => Err(TrackerError::Shutdown),
                }
            }
        }
    }

    /// Take the next tracking result
    ///
    /// After shutdown, frames already produced are still returned until none
    /// are left, then [`TrackerError::Shutdown`].
    pub fn pop_result(&self, timeout: Timeout) -> Result<BodyFrame> {
        match self.pipeline.output.pop(timeout) {
            Ok(frame) => {
                self.pipeline.forget_one();
                PipelineCounters::bump(&self.pipeline.counters.results_popped);
                Ok(frame)
            }
            Err(PopError::Timeout) => Err(TrackerError::Timeout),
            Err(PopError::Closed) => Err(TrackerError::Shutdown),
        }
    }

    /// Set how strongly joint positions are blended with the previous frame
    ///
    /// 0 disables smoothing, 1 freezes the pose. Values outside `[0, 1]` are
    /// clamped; NaN restores the default. Applies to captures not yet inferred.
    pub fn set_temporal_smoothing(&self, factor: f32) {
        let factor = if factor.is_nan() {
            DEFAULT_TRACKER_SMOOTHING_FACTOR
        } else {
            factor.clamp(0.0, 1.0)
        };
        self.pipeline.smoothing.store(factor);
        log::debug!("Temporal smoothing set to {}", factor);
    }

    pub fn temporal_smoothing(&self) -> f32 {
        self.pipeline.smoothing.load()
    }

    /// Captures accepted and not yet returned by `pop_result`
    pub fn queue_size(&self) -> usize {
        self.pipeline.queued.load(Ordering::Acquire)
    }

    /// True once `queue_size` reaches the configured input capacity
    ///
    /// Below that, an `enqueue_capture` cannot wait on a full input queue.
    pub fn is_queue_full(&self) -> bool {
        self.queue_size() >= self.pipeline.config.input_queue_capacity
    }

    pub fn stats(&self) -> TrackerStats {
        self.pipeline.counters.snapshot()
    }

    /// Stop accepting captures and wake every blocked call
    ///
    /// Idempotent. Calls blocked in `enqueue_capture` or `pop_result` return
    /// [`TrackerError::Shutdown`]; results already produced can still be popped.
    pub fn shutdown(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < TrackerState::ShuttingDown as u8).then_some(TrackerState::ShuttingDown as u8)
            });

        let closed_input = self.pipeline.input.close();
        let closed_output = self.pipeline.output.close();
        if closed_input || closed_output {
            log::info!("Body tracker shut down ({})", self.stats());
        }
    }

    /// Shut down, join the workers and free everything the tracker holds
    ///
    /// Frames already popped stay valid. Returns the first worker failure.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.state() == TrackerState::Destroyed {
            return Ok(());
        }
        self.shutdown();

        let mut first_error = None;
        for worker in &mut self.workers {
            match worker.join() {
                Ok(()) => log::debug!("Joined worker {}", worker.id()),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.workers.clear();

        let unclaimed = self.pipeline.output.drain();
        if !unclaimed.is_empty() {
            log::debug!("Releasing {} unclaimed frame(s)", unclaimed.len());
        }
        drop(unclaimed);

        self.set_state(TrackerState::Destroyed);
        self.slot.take();
        log::info!("Body tracker destroyed");

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::error!("Body tracker teardown failed: {}", e);
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("state", &self.state())
            .field("workers", &self.workers.len())
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Image, Luma16Image};
    use crate::estimator::{Estimate, InferenceParams, NullEstimator, PoseEstimator};
    use crate::types::{Body, BodyId, DepthMode, Float3, JointType, Skeleton};
    use crossbeam::channel::{bounded, Receiver, Sender};
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    const PROMPT: Duration = Duration::from_secs(2);

    fn calibration() -> Calibration {
        Calibration::new(DepthMode::NarrowView2x2Binned)
    }

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            worker_poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn capture_at(micros: u64) -> Capture {
        let depth = Image::depth(Luma16Image::new(320, 288))
            .with_device_timestamp(Duration::from_micros(micros));
        Capture::new().with_depth(depth)
    }

    fn tracker_with(config: TrackerConfig) -> Tracker {
        Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            config,
            &NullEstimator::factory(None),
        )
        .unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + PROMPT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    /// One body whose pelvis x equals the capture timestamp in microseconds
    struct MovingBodyEstimator;

    impl PoseEstimator for MovingBodyEstimator {
        fn estimate(
            &mut self,
            capture: &Capture,
            _calibration: &Calibration,
            _params: &InferenceParams,
        ) -> std::result::Result<Estimate, String> {
            let mut skeleton = Skeleton::default();
            let x = capture.device_timestamp().as_micros() as f32;
            skeleton[JointType::Pelvis].position = Float3::new(x, 0.0, 2000.0);
            let mut estimate = Estimate::empty(320, 288);
            estimate.bodies.push(Body::new(BodyId(1), skeleton));
            Ok(estimate)
        }

        fn name(&self) -> &str {
            "moving"
        }
    }

    /// Holds every capture until its release channel disconnects
    struct BlockingEstimator {
        release: Receiver<()>,
    }

    impl PoseEstimator for BlockingEstimator {
        fn estimate(
            &mut self,
            capture: &Capture,
            _calibration: &Calibration,
            _params: &InferenceParams,
        ) -> std::result::Result<Estimate, String> {
            let _ = self.release.recv();
            let (w, h) = capture.depth().map(|d| d.dimensions()).unwrap_or((0, 0));
            Ok(Estimate::empty(w, h))
        }

        fn name(&self) -> &str {
            "blocking"
        }
    }

    fn blocking_tracker() -> (Tracker, Sender<()>) {
        let (release_tx, release_rx) = bounded::<()>(0);
        let factory = move |_: &TrackerConfig,
                            _: &Calibration|
              -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Ok(Box::new(BlockingEstimator {
                release: release_rx.clone(),
            }))
        };
        let tracker = Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            fast_config(),
            &factory,
        )
        .unwrap();
        (tracker, release_tx)
    }

    #[test]
    fn test_lifecycle_states() {
        let tracker = tracker_with(fast_config());
        assert_eq!(tracker.state(), TrackerState::Running);
        assert_eq!(tracker.worker_count(), 1);

        tracker.shutdown();
        assert_eq!(tracker.state(), TrackerState::ShuttingDown);
        tracker.shutdown();
        assert_eq!(tracker.state(), TrackerState::ShuttingDown);

        assert!(tracker.destroy().is_ok());
    }

    #[test]
    fn test_single_worker_preserves_order() {
        let tracker = Arc::new(tracker_with(fast_config()));

        let consumer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                (0..20)
                    .map(|_| tracker.pop_result(Timeout::After(PROMPT)).unwrap())
                    .map(|frame| frame.device_timestamp().as_micros() as u64)
                    .collect::<Vec<_>>()
            })
        };

        for i in 0..20 {
            tracker
                .enqueue_capture(&capture_at(i * 33_333), Timeout::Infinite)
                .unwrap();
        }

        let received = consumer.join().unwrap();
        let expected: Vec<u64> = (0..20).map(|i| i * 33_333).collect();
        assert_eq!(received, expected);

        assert!(wait_until(|| tracker.stats().results_popped == 20));
        let stats = tracker.stats();
        assert_eq!(stats.captures_enqueued, 20);
        assert_eq!(stats.frames_produced, 20);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(tracker.queue_size(), 0);
    }

    #[test]
    fn test_stats_never_show_more_popped_than_produced() {
        let tracker = Arc::new(tracker_with(fast_config()));

        let consumer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let mut worst = 0_i64;
                for _ in 0..200 {
                    tracker.pop_result(Timeout::After(PROMPT)).unwrap();
                    let stats = tracker.stats();
                    worst = worst.max(stats.results_popped as i64 - stats.frames_produced as i64);
                }
                worst
            })
        };

        for i in 0..200 {
            tracker
                .enqueue_capture(&capture_at(i), Timeout::Infinite)
                .unwrap();
        }
        assert!(consumer.join().unwrap() <= 0);
    }

    #[test]
    fn test_no_wait_calls_never_block() {
        let (tracker, release) = blocking_tracker();

        let start = Instant::now();
        assert!(tracker.pop_result(Timeout::NoWait).unwrap_err().is_timeout());

        // The worker holds one capture, the input queue takes three more
        let mut accepted = 0;
        let mut timed_out = false;
        for i in 0..10 {
            match tracker.enqueue_capture(&capture_at(i), Timeout::NoWait) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    assert!(e.is_timeout());
                    timed_out = true;
                    break;
                }
            }
        }
        assert!(timed_out);
        assert!((3..=4).contains(&accepted));
        assert!(tracker.is_queue_full());
        assert!(start.elapsed() < Duration::from_millis(500));

        drop(release);
        tracker.destroy().unwrap();
    }

    #[test]
    fn test_finite_pop_timeout_elapses() {
        let tracker = tracker_with(fast_config());
        let wait = Duration::from_millis(50);

        let start = Instant::now();
        let err = tracker.pop_result(Timeout::After(wait)).unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= wait);
    }

    #[test]
    fn test_shutdown_wakes_all_blocked_consumers() {
        let tracker = Arc::new(tracker_with(fast_config()));

        let consumers: Vec<_> = (0..6)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || tracker.pop_result(Timeout::Infinite))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        tracker.shutdown();

        for consumer in consumers {
            let err = consumer.join().unwrap().unwrap_err();
            assert!(err.is_shutdown());
        }
        assert!(start.elapsed() < PROMPT);

        let tracker = Arc::try_unwrap(tracker).unwrap();
        tracker.destroy().unwrap();
    }

    #[test]
    fn test_shutdown_wakes_blocked_producer() {
        let (tracker, release) = blocking_tracker();
        let tracker = Arc::new(tracker);

        let producer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0.. {
                    if let Err(e) = tracker.enqueue_capture(&capture_at(i), Timeout::Infinite) {
                        return e;
                    }
                }
                unreachable!()
            })
        };

        assert!(wait_until(|| tracker.queue_size() >= 4));
        tracker.shutdown();
        assert!(producer.join().unwrap().is_shutdown());

        drop(release);
        Arc::try_unwrap(tracker).unwrap().destroy().unwrap();
    }

    #[test]
    fn test_enqueue_after_shutdown_fails_immediately() {
        let tracker = tracker_with(fast_config());
        tracker.shutdown();

        let start = Instant::now();
        let err = tracker
            .enqueue_capture(&capture_at(0), Timeout::Infinite)
            .unwrap_err();
        assert!(err.is_shutdown());

        // Shutdown wins over capture validation
        let bad = Capture::new();
        assert!(tracker
            .enqueue_capture(&bad, Timeout::Infinite)
            .unwrap_err()
            .is_shutdown());
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(tracker.stats().captures_enqueued, 0);
    }

    #[test]
    fn test_enqueue_after_shutdown_reports_shutdown_when_full() {
        let (tracker, release) = blocking_tracker();
        for i in 0..4 {
            tracker
                .enqueue_capture(&capture_at(i), Timeout::After(PROMPT))
                .unwrap();
        }
        assert!(wait_until(|| tracker.pipeline.input.is_full()));
        assert!(tracker
            .enqueue_capture(&capture_at(9), Timeout::NoWait)
            .unwrap_err()
            .is_timeout());

        tracker.shutdown();
        let err = tracker
            .enqueue_capture(&capture_at(10), Timeout::NoWait)
            .unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(tracker.stats().captures_enqueued, 4);

        drop(release);
        tracker.destroy().unwrap();
    }

    #[test]
    fn test_results_drain_after_shutdown() {
        let tracker = tracker_with(fast_config());
        for i in 0..3 {
            tracker.enqueue_capture(&capture_at(i), Timeout::Infinite).unwrap();
        }
        assert!(wait_until(|| tracker.pipeline.output.len() == 3));

        tracker.shutdown();
        for i in 0..3 {
            let frame = tracker.pop_result(Timeout::Infinite).unwrap();
            assert_eq!(frame.device_timestamp(), Duration::from_micros(i));
        }
        assert!(tracker
            .pop_result(Timeout::Infinite)
            .unwrap_err()
            .is_shutdown());
    }

    #[test]
    fn test_popped_frame_reference_counting() {
        let tracker = tracker_with(fast_config());
        let capture = capture_at(5);
        tracker.enqueue_capture(&capture, Timeout::Infinite).unwrap();

        let frame = tracker.pop_result(Timeout::After(PROMPT)).unwrap();
        assert_eq!(frame.ref_count(), 1);
        assert!(frame.capture().ptr_eq(&capture));

        let mut extra: Vec<_> = (0..4).map(|_| frame.reference()).collect();
        assert_eq!(frame.ref_count(), 5);
        for r in extra.drain(..2) {
            r.release();
        }
        assert_eq!(extra.len(), 2);
        assert_eq!(frame.ref_count(), 3);
        drop(extra);

        tracker.destroy().unwrap();
        // The popped frame outlives the tracker and still pins the capture
        assert_eq!(capture.ref_count(), 2);
        drop(frame);
        assert_eq!(capture.ref_count(), 1);
    }

    #[test]
    fn test_output_backpressure_stalls_worker() {
        let tracker = Arc::new(tracker_with(fast_config()));

        for i in 0..5 {
            tracker
                .enqueue_capture(&capture_at(i), Timeout::Infinite)
                .unwrap();
        }

        // Three frames fill the output queue; the fourth waits inside the worker
        assert!(wait_until(|| tracker.stats().frames_produced == 4));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(tracker.stats().frames_produced, 4);
        assert_eq!(tracker.pipeline.output.len(), 3);
        assert_eq!(tracker.pipeline.input.len(), 1);
        assert_eq!(tracker.queue_size(), 5);

        let popped: Vec<u64> = (0..5)
            .map(|_| tracker.pop_result(Timeout::After(PROMPT)).unwrap())
            .map(|frame| frame.device_timestamp().as_micros() as u64)
            .collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert_eq!(tracker.queue_size(), 0);
    }

    #[test]
    fn test_concurrent_create_has_one_winner() {
        let registry = Arc::new(TrackerRegistry::new());
        let barrier = Arc::new(Barrier::new(2));

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    Tracker::create_with_registry(
                        &registry,
                        calibration(),
                        fast_config(),
                        &NullEstimator::factory(None),
                    )
                })
            })
            .collect();

        let results: Vec<_> = attempts.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(TrackerError::AlreadyExists)))
            .count();
        assert_eq!((winners, losers), (1, 1));

        for result in results {
            if let Ok(tracker) = result {
                tracker.destroy().unwrap();
            }
        }
        assert!(!registry.is_occupied());
    }

    #[test]
    fn test_global_registry_allows_one_tracker() {
        let first = Tracker::create(calibration(), fast_config(), &NullEstimator::factory(None))
            .unwrap();
        let second = Tracker::create(calibration(), fast_config(), &NullEstimator::factory(None));
        assert!(matches!(second, Err(TrackerError::AlreadyExists)));

        first.destroy().unwrap();
        let again = Tracker::create(calibration(), fast_config(), &NullEstimator::factory(None));
        assert!(again.is_ok());
    }

    #[test]
    fn test_failed_create_releases_registry() {
        let registry = Arc::new(TrackerRegistry::new());

        let err = Tracker::create_with_registry(
            &registry,
            Calibration::new(DepthMode::Off),
            fast_config(),
            &NullEstimator::factory(None),
        )
        .unwrap_err();
        assert!(matches!(err, TrackerError::NoDepthMode(DepthMode::Off)));
        assert!(!registry.is_occupied());

        let broken = |_: &TrackerConfig,
                      _: &Calibration|
         -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Err("no GPU".to_string())
        };
        let err =
            Tracker::create_with_registry(&registry, calibration(), fast_config(), &broken)
                .unwrap_err();
        assert!(matches!(err, TrackerError::BackendError(_)));
        assert!(!registry.is_occupied());
    }

    #[test]
    fn test_drop_releases_registry() {
        let registry = Arc::new(TrackerRegistry::new());
        {
            let _tracker = Tracker::create_with_registry(
                &registry,
                calibration(),
                fast_config(),
                &NullEstimator::factory(None),
            )
            .unwrap();
            assert!(registry.is_occupied());
        }
        assert!(!registry.is_occupied());
    }

    #[test]
    fn test_invalid_capture_leaves_queue_untouched() {
        let tracker = tracker_with(fast_config());

        let wrong_size = Capture::new().with_depth(Image::depth(Luma16Image::new(640, 576)));
        let err = tracker
            .enqueue_capture(&wrong_size, Timeout::NoWait)
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidCapture(_)));

        let no_depth = Capture::new().with_ir(Image::ir(Luma16Image::new(320, 288)));
        assert!(tracker.enqueue_capture(&no_depth, Timeout::NoWait).is_err());

        assert_eq!(tracker.queue_size(), 0);
        assert_eq!(tracker.stats().captures_enqueued, 0);
        assert_eq!(wrong_size.ref_count(), 1);
    }

    #[test]
    fn test_smoothing_factor_is_clamped() {
        let config = TrackerConfig {
            temporal_smoothing: 0.4,
            ..fast_config()
        };
        let tracker = tracker_with(config);
        assert_eq!(tracker.temporal_smoothing(), 0.4);

        tracker.set_temporal_smoothing(0.25);
        assert_eq!(tracker.temporal_smoothing(), 0.25);
        tracker.set_temporal_smoothing(2.0);
        assert_eq!(tracker.temporal_smoothing(), 1.0);
        tracker.set_temporal_smoothing(-0.5);
        assert_eq!(tracker.temporal_smoothing(), 0.0);
        tracker.set_temporal_smoothing(f32::NAN);
        assert_eq!(tracker.temporal_smoothing(), DEFAULT_TRACKER_SMOOTHING_FACTOR);
    }

    #[test]
    fn test_smoothing_applies_to_later_captures() {
        let factory = |_: &TrackerConfig,
                       _: &Calibration|
         -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Ok(Box::new(MovingBodyEstimator))
        };
        let tracker = Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            fast_config(),
            &factory,
        )
        .unwrap();
        tracker.set_temporal_smoothing(0.5);

        let mut pelvis_x = Vec::new();
        for micros in [0, 100] {
            tracker
                .enqueue_capture(&capture_at(micros), Timeout::Infinite)
                .unwrap();
            let frame = tracker.pop_result(Timeout::After(PROMPT)).unwrap();
            assert_eq!(frame.body_id(0), BodyId(1));
            pelvis_x.push(frame.skeleton(0).unwrap()[JointType::Pelvis].position.x);
        }
        assert_eq!(pelvis_x, vec![0.0, 50.0]);
    }

    #[test]
    fn test_queue_full_follows_configured_capacity() {
        let (release_tx, release_rx) = bounded::<()>(0);
        let factory = move |_: &TrackerConfig,
                            _: &Calibration|
              -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Ok(Box::new(BlockingEstimator {
                release: release_rx.clone(),
            }))
        };
        let config = TrackerConfig {
            input_queue_capacity: 10,
            ..fast_config()
        };
        let tracker = Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            config,
            &factory,
        )
        .unwrap();

        for i in 0..3 {
            tracker.enqueue_capture(&capture_at(i), Timeout::NoWait).unwrap();
        }
        assert!(!tracker.is_queue_full());

        for i in 3..10 {
            tracker.enqueue_capture(&capture_at(i), Timeout::NoWait).unwrap();
        }
        assert_eq!(tracker.queue_size(), 10);
        assert!(tracker.is_queue_full());

        drop(release_tx);
        tracker.destroy().unwrap();
    }

    #[test]
    fn test_estimator_params_do_not_carry_smoothing() {
        let (params_tx, params_rx) = bounded::<InferenceParams>(8);
        struct RecordingEstimator {
            seen: Sender<InferenceParams>,
        }

        impl PoseEstimator for RecordingEstimator {
            fn estimate(
                &mut self,
                _capture: &Capture,
                _calibration: &Calibration,
                params: &InferenceParams,
            ) -> std::result::Result<Estimate, String> {
                let _ = self.seen.send(*params);
                Ok(Estimate::empty(320, 288))
            }

            fn name(&self) -> &str {
                "recording"
            }
        }

        let factory = move |_: &TrackerConfig,
                            _: &Calibration|
              -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Ok(Box::new(RecordingEstimator {
                seen: params_tx.clone(),
            }))
        };
        let tracker = Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            fast_config(),
            &factory,
        )
        .unwrap();

        for (i, factor) in [0.0, 0.9].into_iter().enumerate() {
            tracker.set_temporal_smoothing(factor);
            tracker
                .enqueue_capture(&capture_at(i as u64), Timeout::Infinite)
                .unwrap();
            tracker.pop_result(Timeout::After(PROMPT)).unwrap();
        }

        let expected = InferenceParams::from_config(tracker.config());
        let seen: Vec<_> = params_rx.try_iter().collect();
        assert_eq!(seen, vec![expected, expected]);
    }

    #[test]
    fn test_estimator_panic_does_not_stall_tracker() {
        /// Panics on its first capture, then behaves
        struct PanicOnce {
            panicked: bool,
        }

        impl PoseEstimator for PanicOnce {
            fn estimate(
                &mut self,
                capture: &Capture,
                _calibration: &Calibration,
                _params: &InferenceParams,
            ) -> std::result::Result<Estimate, String> {
                if !self.panicked {
                    self.panicked = true;
                    panic!("corrupt model state");
                }
                let (w, h) = capture.depth().map(|d| d.dimensions()).unwrap_or((0, 0));
                Ok(Estimate::empty(w, h))
            }

            fn name(&self) -> &str {
                "panic-once"
            }
        }

        let factory = |_: &TrackerConfig,
                       _: &Calibration|
         -> std::result::Result<Box<dyn PoseEstimator>, String> {
            Ok(Box::new(PanicOnce { panicked: false }))
        };
        let tracker = Tracker::create_with_registry(
            &Arc::new(TrackerRegistry::new()),
            calibration(),
            fast_config(),
            &factory,
        )
        .unwrap();

        let mut popped = Vec::new();
        for i in 0..10 {
            tracker
                .enqueue_capture(&capture_at(i), Timeout::After(PROMPT))
                .unwrap();
            if let Ok(frame) = tracker.pop_result(Timeout::After(Duration::from_millis(200))) {
                popped.push(frame.device_timestamp().as_micros() as u64);
            }
        }

        assert_eq!(popped, (1..10).collect::<Vec<u64>>());
        assert_eq!(tracker.state(), TrackerState::Running);
        assert_eq!(tracker.stats().inference_failures, 1);
        assert_eq!(tracker.queue_size(), 0);
        assert!(tracker.destroy().is_ok());
    }

    #[test]
    fn test_multiple_workers_deliver_every_capture() {
        let tracker = Arc::new(tracker_with(fast_config().with_worker_count(3)));
        assert_eq!(tracker.worker_count(), 3);

        let consumer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let mut seen: Vec<u64> = (0..12)
                    .map(|_| tracker.pop_result(Timeout::After(PROMPT)).unwrap())
                    .map(|frame| frame.device_timestamp().as_micros() as u64)
                    .collect();
                seen.sort_unstable();
                seen
            })
        };

        for i in 0..12 {
            tracker
                .enqueue_capture(&capture_at(i), Timeout::Infinite)
                .unwrap();
        }
        assert_eq!(consumer.join().unwrap(), (0..12).collect::<Vec<u64>>());
    }

    #[test]
    fn test_destroy_releases_unclaimed_frames() {
        let tracker = tracker_with(fast_config());
        let captures: Vec<_> = (0..3).map(capture_at).collect();
        for capture in &captures {
            tracker.enqueue_capture(capture, Timeout::Infinite).unwrap();
        }
        assert!(wait_until(|| tracker.pipeline.output.len() == 3));
        assert!(captures.iter().all(|c| c.ref_count() == 2));

        tracker.destroy().unwrap();
        assert!(captures.iter().all(|c| c.ref_count() == 1));
    }
}
