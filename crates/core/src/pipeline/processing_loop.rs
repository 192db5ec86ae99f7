use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::face_detector::{DetectionParams, FaceDetector};
use crate::device::domain::remote_device::RemoteDevice;
use crate::pipeline::cycle_logger::{CycleLogger, NullCycleLogger};
use crate::pipeline::frame_slot::FrameSlot;
use crate::shared::constants::DEFAULT_READY_TIMEOUT_MS;
use crate::shared::face_rect::DetectionReport;
use crate::shared::shutdown::ShutdownToken;
use crate::video::domain::image_writer::ImageWriter;

/// Result of one pass through the processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No readiness signal arrived within the wait timeout.
    TimedOut,
    /// Signalled, but the slot has never held a frame.
    Empty,
    /// A frame was detected on and persisted.
    Processed {
        sequence: u64,
        faces: usize,
        /// Whether a report reached the device. Always false for zero faces.
        reported: bool,
    },
}

/// Waits for fresh frames and runs detect, annotate, report and persist on each.
///
/// The slot lock is held only while grabbing the frame reference; the working
/// copy is private to the cycle, so markers never leak back into the slot.
pub struct ProcessingLoop {
    slot: Arc<FrameSlot>,
    detector: Box<dyn FaceDetector>,
    annotator: Box<dyn FrameAnnotator>,
    writer: Box<dyn ImageWriter>,
    device: Arc<dyn RemoteDevice>,
    output_path: PathBuf,
    params: DetectionParams,
    wait_timeout: Duration,
    logger: Box<dyn CycleLogger>,
}

impl ProcessingLoop {
    pub fn new(
        slot: Arc<FrameSlot>,
        detector: Box<dyn FaceDetector>,
        annotator: Box<dyn FrameAnnotator>,
        writer: Box<dyn ImageWriter>,
        device: Arc<dyn RemoteDevice>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slot,
            detector,
            annotator,
            writer,
            device,
            output_path: output_path.into(),
            params: DetectionParams::default(),
            wait_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            logger: Box::new(NullCycleLogger),
        }
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    /// Upper bound on each readiness wait; also bounds shutdown latency.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn CycleLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Waits once for readiness and processes the current frame if signalled.
    ///
    /// Errors from detection, annotation or persistence abort this cycle only.
    /// A failed report is logged and does not stop persistence.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, Box<dyn std::error::Error>> {
        if !self.slot.wait_ready(self.wait_timeout) {
            return Ok(CycleOutcome::TimedOut);
        }
        let Some(snapshot) = self.slot.try_take_snapshot() else {
            return Ok(CycleOutcome::Empty);
        };
        let mut frame = Arc::try_unwrap(snapshot).unwrap_or_else(|shared| (*shared).clone());
        let sequence = frame.sequence();

        let t0 = Instant::now();
        let gray = frame.to_grayscale();
        let faces = self.detector.detect(&gray, &self.params)?;
        self.logger.timing("detect", elapsed_ms(t0));
        self.logger.metric("faces", faces.len() as f64);

        let mut reported = false;
        if !faces.is_empty() {
            let t0 = Instant::now();
            self.annotator.annotate(&mut frame, &faces)?;
            self.logger.timing("annotate", elapsed_ms(t0));

            let t0 = Instant::now();
            let report = DetectionReport::new(faces.clone());
            match self.device.report_faces(&report) {
                Ok(()) => reported = true,
                Err(e) => log::warn!("Reporting {} faces failed: {e}", report.len()),
            }
            self.logger.timing("report", elapsed_ms(t0));
        }

        let t0 = Instant::now();
        self.writer.write(&self.output_path, &frame)?;
        self.logger.timing("persist", elapsed_ms(t0));
        self.logger.cycle_completed(sequence);

        Ok(CycleOutcome::Processed {
            sequence,
            faces: faces.len(),
            reported,
        })
    }

    /// Cycles until shutdown. Returns the number of frames processed.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> usize {
        log::info!(
            "Processing loop started, writing to {}",
            self.output_path.display()
        );
        let mut processed = 0;
        while !shutdown.is_cancelled() {
            match self.run_cycle() {
                Ok(CycleOutcome::Processed {
                    sequence, faces, ..
                }) => {
                    processed += 1;
                    log::info!("Frame #{sequence}: {faces} face(s)");
                }
                Ok(CycleOutcome::TimedOut | CycleOutcome::Empty) => {}
                Err(e) => {
                    log::error!("Processing cycle failed: {e}");
                    self.logger.cycle_failed(&e.to_string());
                }
            }
        }
        log::info!("Processing loop stopped after {processed} frames");
        processed
    }

    /// Emits the logger's end-of-run summary.
    pub fn summary(&self) {
        self.logger.summary();
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
