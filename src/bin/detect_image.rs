//! Run object detection once on a still image

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rpi_detect_streamer::detection::{self, DetectionFilter, DetectorBackend, DetectorOptions};
use rpi_detect_streamer::{single_shot, telemetry, BoxAnnotator};

#[derive(Parser, Debug)]
#[command(name = "detect-image")]
#[command(about = "Run object detection on a provided image")]
#[command(version)]
struct Cli {
    /// Input image to detect objects in
    #[arg(short, long, default_value_os_t = default_image())]
    image: PathBuf,

    /// Path of the object detection model
    #[arg(short, long, default_value = "yolov8n.onnx")]
    model: PathBuf,

    /// Inference backend, `none` reports no detections
    #[arg(short, long, value_enum, default_value_t = DetectorBackend::Auto)]
    backend: DetectorBackend,

    /// Number of CPU threads to run the model
    #[arg(short = 't', long = "numThreads", default_value_t = 4)]
    num_threads: usize,

    /// Run the model on an EdgeTPU
    #[arg(short = 'x', long = "enableEdgeTPU")]
    enable_edgetpu: bool,

    /// Write the annotated image to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// `$SNAP/grace_hopper.bmp` inside a snap, `./grace_hopper.bmp` otherwise
fn default_image() -> PathBuf {
    let base = std::env::var_os("SNAP").unwrap_or_else(|| ".".into());
    PathBuf::from(base).join("grace_hopper.bmp")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let options = DetectorOptions {
        backend: cli.backend,
        model_path: cli.model.clone(),
        num_threads: cli.num_threads,
        enable_edgetpu: cli.enable_edgetpu,
        filter: DetectionFilter::default(),
    };

    let mut detector = detection::load(&options).context("failed to load detector")?;
    let image = single_shot::load_image(&cli.image)
        .with_context(|| format!("failed to read image {}", cli.image.display()))?;

    let report = single_shot::run(
        detector.as_mut(),
        &mut BoxAnnotator::default(),
        image,
        &options.filter,
        cli.output.as_deref(),
    )?;

    println!("{}", report);
    Ok(())
}
