use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use camera_bridge_core::annotation::infrastructure::rectangle_marker::RectangleMarker;
use camera_bridge_core::detection::domain::face_detector::FaceDetector;
use camera_bridge_core::detection::infrastructure::model_resolver::{self, ProgressFn};
use camera_bridge_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use camera_bridge_core::device::infrastructure::http_remote_device::HttpRemoteDevice;
use camera_bridge_core::pipeline::cycle_logger::LogCycleLogger;
use camera_bridge_core::pipeline::infrastructure::threaded_bridge::{BridgeParts, ThreadedBridge};
use camera_bridge_core::shared::config::{BridgeConfig, DeliveryMode};
use camera_bridge_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use camera_bridge_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Bridges a network camera and face detection: requests captures, ingests
/// uploaded frames, and reports detected faces back to the device.
#[derive(Parser)]
#[command(name = "camera-bridge")]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device base URL, e.g. http://192.168.4.1 (sets all three device endpoints).
    #[arg(long)]
    device: Option<String>,

    /// Capture command URL.
    #[arg(long)]
    capture_url: Option<String>,

    /// URL of the device's last saved photo.
    #[arg(long)]
    saved_photo_url: Option<String>,

    /// Face report URL.
    #[arg(long)]
    report_url: Option<String>,

    /// Address for the ingestion endpoint and viewer.
    #[arg(long)]
    listen: Option<String>,

    /// Where the annotated frame is written.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Milliseconds between capture requests.
    #[arg(long)]
    interval: Option<u64>,

    /// Download the saved photo after each capture instead of waiting for uploads.
    #[arg(long)]
    pull: bool,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// ONNX face model to use instead of the cached download.
    #[arg(long)]
    model: Option<PathBuf>,
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
    let config = build_config(cli)?;
    config.validate()?;

    let detector = build_detector(&config)?;
    let device = HttpRemoteDevice::new(
        config.capture_url.as_str(),
        config.saved_photo_url.as_str(),
        config.report_url.as_str(),
        config.request_timeout(),
    )?;

    let parts = BridgeParts {
        device: Arc::new(device),
        detector,
        annotator: Box::new(RectangleMarker::default()),
        writer: Box::new(ImageFileWriter::new()),
        logger: Box::new(LogCycleLogger::new()),
    };

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let bridge = ThreadedBridge::start(&config, parts)?;
    log::info!(
        "Capturing from {}, output at {}",
        config.capture_url,
        config.output_path.display()
    );

    // Sender lives in the signal handler for the rest of the process.
    let _ = stop_rx.recv();
    bridge.shutdown()
}

fn build_config(cli: Cli) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(base) = &cli.device {
        config.set_device_url(base);
    }
    if let Some(url) = cli.capture_url {
        config.capture_url = url;
    }
    if let Some(url) = cli.saved_photo_url {
        config.saved_photo_url = url;
    }
    if let Some(url) = cli.report_url {
        config.report_url = url;
    }
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(ms) = cli.interval {
        config.acquisition_interval_ms = ms;
    }
    if cli.pull {
        config.delivery = DeliveryMode::Pull;
    }
    if let Some(confidence) = cli.confidence {
        config.detection.confidence = confidence;
    }
    if cli.model.is_some() {
        config.model_path = cli.model;
    }
    Ok(config)
}

fn build_detector(config: &BridgeConfig) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let (progress, downloaded) = download_progress();
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        config.model_path.as_deref(),
        Some(progress),
    )?;
    // Finish the progress line, if one was drawn.
    if downloaded.load(Ordering::Relaxed) {
        eprintln!();
    }

    Ok(Box::new(OnnxFaceDetector::new(&model_path)?))
}

/// Progress printer for the model download, plus a flag set once it has run.
fn download_progress() -> (ProgressFn, Arc<AtomicBool>) {
    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let progress: ProgressFn = Box::new(move |downloaded, total| {
        flag.store(true, Ordering::Relaxed);
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading face detection model... {pct}%");
        } else {
            eprint!("\rDownloading face detection model... {downloaded} bytes");
        }
    });
    (progress, started)
}
