use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use cardscan_core::pipeline::infrastructure::frame_worker::{FrameWorker, Submission};
use cardscan_core::pipeline::processing_service::{FrameReport, ProcessingService, ScanEvent};
use cardscan_core::pipeline::scan_logger::StdoutScanLogger;
use cardscan_core::shared::config::ScanConfig;
use cardscan_core::shared::error::CardError;
use cardscan_core::shared::frame::Frame;
use cardscan_core::source::domain::image_writer::ImageWriter;
use cardscan_core::source::infrastructure::image_file_writer::ImageFileWriter;
use cardscan_core::source::infrastructure::image_sequence_source::ImageSequenceSource;

/// Detects a business card in a sequence of images and writes a
/// perspective-corrected crop.
#[derive(Parser)]
#[command(name = "cardscan")]
struct Cli {
    /// Input images or directories of images, played back as camera frames.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where to write the rectified card.
    #[arg(short, long, default_value = "card.png")]
    output: PathBuf,

    /// Also write the captured frame with the detected outline drawn on it.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// JSON config file (defaults to the per-user config if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config to this path and continue.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Candidates needed before capture (capture fires above this count).
    #[arg(long)]
    threshold: Option<usize>,

    /// Allowed deviation from the card aspect ratio.
    #[arg(long)]
    aspect_tolerance: Option<f32>,

    /// Upper bound for the crop's long side in pixels.
    #[arg(long)]
    max_long_side: Option<u32>,

    /// Play the input sequence this many times (a single photo needs
    /// threshold + 1 passes to capture).
    #[arg(long, default_value = "1")]
    repeat: usize,

    /// Simulate a live camera at this frame rate: frames go through the
    /// background worker and are dropped while it is busy.
    #[arg(long)]
    fps: Option<f64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    if let Some(path) = &cli.save_config {
        config.save(path)?;
        log::info!("Config written to {}", path.display());
    }

    let service = ProcessingService::from_config(&config)?
        .with_logger(Box::new(StdoutScanLogger::default()))
        .into_shared();
    let events = service.subscribe();

    let source = open_source(&cli.inputs)?;
    if source.is_empty() {
        return Err("No images found in the given inputs".into());
    }
    if source.len() * cli.repeat <= config.accumulator.threshold {
        log::warn!(
            "{} frames cannot exceed the capture threshold of {}; try --repeat",
            source.len() * cli.repeat,
            config.accumulator.threshold
        );
    }

    let frames = source.replay(cli.repeat).filter_map(|f| match f {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::warn!("Skipping input: {e}");
            None
        }
    });
    match cli.fps {
        Some(fps) => scan_live(&service, frames, fps),
        None => scan(&service, frames),
    }
    service.summary();

    let last_count = events
        .try_iter()
        .filter_map(|e| match e {
            ScanEvent::CandidateCount(c) => Some(c),
            _ => None,
        })
        .last()
        .unwrap_or(0);

    let crop = match service.get_cropped_image() {
        Ok(crop) => crop,
        Err(CardError::NoImageAvailable) => {
            return Err(format!(
                "No card captured ({last_count} candidates, need more than {})",
                config.accumulator.threshold
            )
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let writer = ImageFileWriter::new();
    writer.write(&cli.output, &crop)?;
    log::info!(
        "Card ({}x{}) written to {}",
        crop.width(),
        crop.height(),
        cli.output.display()
    );

    if let (Some(path), Some(capture)) = (&cli.overlay, service.last_capture()) {
        writer.write(path, &capture.annotated()?)?;
        log::info!("Overlay written to {}", path.display());
    }

    Ok(())
}

/// Processes frames in order until the first capture.
fn scan(service: &ProcessingService, frames: impl Iterator<Item = Frame>) {
    for frame in frames {
        match service.process_frame(&frame) {
            Ok(FrameReport::Captured { .. }) => break,
            Ok(_) => {}
            Err(e) => log::warn!("Frame {}: {e}", frame.index()),
        }
    }
}

/// Submits frames at a fixed rate like a live camera. Frames arriving while
/// the worker is busy are dropped.
fn scan_live(service: &Arc<ProcessingService>, frames: impl Iterator<Item = Frame>, fps: f64) {
    let interval = Duration::from_secs_f64(1.0 / fps);
    let worker = FrameWorker::spawn(service.clone());
    for frame in frames {
        if service.is_triggered() {
            break;
        }
        if worker.submit(frame) == Submission::Closed {
            break;
        }
        std::thread::sleep(interval);
    }
    let stats = worker.shutdown();
    log::info!(
        "Worker: {} processed, {} skipped, {} failed, {} dropped",
        stats.processed,
        stats.skipped,
        stats.failed,
        stats.dropped
    );
}

fn build_config(cli: &Cli) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::load_or_default(),
    };

    if let Some(threshold) = cli.threshold {
        config.accumulator.threshold = threshold;
        config.accumulator.capacity = config.accumulator.capacity.max(threshold + 1);
    }
    if let Some(tolerance) = cli.aspect_tolerance {
        config.detector.aspect_tolerance = tolerance;
    }
    if let Some(max_long_side) = cli.max_long_side {
        config.rectifier.max_long_side = max_long_side;
    }
    config.validate()?;
    Ok(config)
}

fn open_source(inputs: &[PathBuf]) -> Result<ImageSequenceSource, CardError> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(ImageSequenceSource::from_dir(input)?.paths().iter().cloned());
        } else {
            paths.push(input.clone());
        }
    }
    Ok(ImageSequenceSource::from_paths(paths))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if cli.repeat == 0 {
        return Err("--repeat must be at least 1".into());
    }
    if let Some(tolerance) = cli.aspect_tolerance {
        if !(tolerance > 0.0) {
            return Err(format!("Aspect tolerance must be positive, got {tolerance}").into());
        }
    }
    if let Some(fps) = cli.fps {
        if !(fps > 0.0 && fps.is_finite()) {
            return Err(format!("--fps must be positive, got {fps}").into());
        }
    }
    if cli.max_long_side == Some(0) {
        return Err("--max-long-side must be positive".into());
    }
    if same_path(&cli.output, cli.overlay.as_deref()) {
        return Err("--output and --overlay must differ".into());
    }
    Ok(())
}

fn same_path(a: &Path, b: Option<&Path>) -> bool {
    b.is_some_and(|b| a == b)
}
