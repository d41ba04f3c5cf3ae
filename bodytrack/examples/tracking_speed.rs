/// Body tracking throughput on synthetic depth captures
///
/// Usage:
///   cargo run --release --example tracking_speed -- [frames] [S|P|E] [C|G] [latency_ms] [workers]
///
/// Modes:
///   S - single thread: enqueue and pop from the main thread
///   P - pop in background: a second thread pops results
///   E - enqueue in background: a second thread enqueues captures
use anyhow::{bail, Context, Result};
use body_tracker::{
    Calibration, Capture, DepthMode, Image, Luma16Image, NullEstimator, ProcessingMode, Timeout,
    Tracker, TrackerConfig,
};
use image::Luma;
use rand::Rng;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

const DEPTH_MODE: DepthMode = DepthMode::NarrowViewUnbinned;
const FRAME_INTERVAL_US: u64 = 33_333;

#[derive(Debug, Clone, Copy)]
enum Mode {
    SingleThread,
    PopInBackground,
    EnqueueInBackground,
}

impl Mode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "s" => Ok(Self::SingleThread),
            "p" => Ok(Self::PopInBackground),
            "e" => Ok(Self::EnqueueInBackground),
            other => bail!("Invalid mode '{}'. Expected 'S', 'P' or 'E'", other),
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    frames: usize,
    frames_with_bodies: usize,
}

impl Totals {
    fn record(&mut self, body_count: usize) {
        self.frames += 1;
        if body_count > 0 {
            self.frames_with_bodies += 1;
        }
    }
}

/// Random depth noise shared by every capture; each capture gets its own copy
fn depth_template() -> Luma16Image {
    let (width, height) = DEPTH_MODE.resolution();
    let mut rng = rand::thread_rng();
    Luma16Image::from_fn(width, height, |_, _| Luma([rng.gen_range(500..4500)]))
}

fn make_capture(template: &Luma16Image, index: u64) -> Capture {
    let depth = Image::depth(template.clone())
        .with_device_timestamp(Duration::from_micros(index * FRAME_INTERVAL_US));
    Capture::new().with_depth(depth)
}

fn run_single_thread(tracker: &Tracker, template: &Luma16Image, frames: u64) -> Result<Totals> {
    let mut totals = Totals::default();

    for i in 0..frames {
        // Free a slot first so enqueue cannot wait on ourselves
        if tracker.is_queue_full() {
            let frame = tracker.pop_result(Timeout::Infinite)?;
            totals.record(frame.body_count());
        }

        tracker.enqueue_capture(&make_capture(template, i), Timeout::Infinite)?;

        while let Ok(frame) = tracker.pop_result(Timeout::NoWait) {
            totals.record(frame.body_count());
        }
    }

    while tracker.queue_size() > 0 {
        let frame = tracker.pop_result(Timeout::Infinite)?;
        totals.record(frame.body_count());
    }

    Ok(totals)
}

fn run_pop_in_background(tracker: &Tracker, template: &Luma16Image, frames: u64) -> Result<Totals> {
    thread::scope(|scope| {
        let popper = scope.spawn(|| {
            let mut totals = Totals::default();
            // Ends when the tracker shuts down and the results are drained
            while let Ok(frame) = tracker.pop_result(Timeout::Infinite) {
                totals.record(frame.body_count());
            }
            totals
        });

        let enqueued = (0..frames)
            .try_for_each(|i| tracker.enqueue_capture(&make_capture(template, i), Timeout::Infinite));
        if enqueued.is_ok() {
            while tracker.queue_size() > 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        tracker.shutdown();

        let totals = popper
            .join()
            .map_err(|_| anyhow::anyhow!("Pop thread panicked"))?;
        enqueued?;
        Ok(totals)
    })
}

fn run_enqueue_in_background(
    tracker: &Tracker,
    template: &Luma16Image,
    frames: u64,
) -> Result<Totals> {
    thread::scope(|scope| {
        let producer = scope.spawn(|| {
            (0..frames)
                .try_for_each(|i| tracker.enqueue_capture(&make_capture(template, i), Timeout::Infinite))
        });

        let mut totals = Totals::default();
        let popped = loop {
            match tracker.pop_result(Timeout::After(Duration::from_millis(100))) {
                Ok(frame) => totals.record(frame.body_count()),
                Err(e) if e.is_timeout() => {
                    if producer.is_finished() && tracker.queue_size() == 0 {
                        break Ok(());
                    }
                }
                Err(e) => {
                    // Unblock the producer before the scope joins it
                    tracker.shutdown();
                    break Err(e);
                }
            }
        };

        producer
            .join()
            .map_err(|_| anyhow::anyhow!("Enqueue thread panicked"))??;
        popped?;
        Ok(totals)
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    body_tracker::init()?;

    let args: Vec<String> = env::args().collect();
    let frames: u64 = match args.get(1) {
        Some(value) => value.parse().context("frame count must be a positive integer")?,
        None => 300,
    };
    let mode = Mode::parse(args.get(2).map(String::as_str).unwrap_or(""))?;
    let processing_mode = match args.get(3).map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("g") => ProcessingMode::GpuCuda,
        Some("c") => ProcessingMode::Cpu,
        Some(other) => bail!("Invalid processing mode '{}'. Expected 'C' or 'G'", other),
    };
    let latency = match args.get(4) {
        Some(value) => Duration::from_millis(value.parse().context("latency must be in ms")?),
        None => Duration::from_millis(15),
    };
    let workers: usize = match args.get(5) {
        Some(value) => value.parse().context("worker count must be a positive integer")?,
        None => 1,
    };

    println!("Body tracking speed test");
    println!(
        "  {} frames, {:?} mode, {:?}, {}ms simulated inference, {} worker(s)",
        frames,
        mode,
        processing_mode,
        latency.as_millis(),
        workers
    );

    let config = TrackerConfig::default()
        .with_processing_mode(processing_mode)
        .with_worker_count(workers);
    let tracker = Tracker::create(
        Calibration::new(DEPTH_MODE),
        config,
        &NullEstimator::factory(Some(latency)),
    )?;

    let template = depth_template();
    let start = Instant::now();
    let totals = match mode {
        Mode::SingleThread => run_single_thread(&tracker, &template, frames)?,
        Mode::PopInBackground => run_pop_in_background(&tracker, &template, frames)?,
        Mode::EnqueueInBackground => run_enqueue_in_background(&tracker, &template, frames)?,
    };
    let elapsed = start.elapsed();

    let stats = tracker.stats();
    tracker.destroy()?;

    println!("  Processed frames:  {}", totals.frames);
    println!("  Frames with bodies: {}", totals.frames_with_bodies);
    println!("  Elapsed:           {:.2}s", elapsed.as_secs_f32());
    println!(
        "  Throughput:        {:.1} fps",
        totals.frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON)
    );
    println!("  Pipeline:          {}", stats);

    Ok(())
}
