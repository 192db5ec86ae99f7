use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::face_detector::FaceDetector;
use crate::device::domain::remote_device::RemoteDevice;
use crate::pipeline::acquisition_loop::AcquisitionLoop;
use crate::pipeline::cycle_logger::CycleLogger;
use crate::pipeline::frame_slot::FrameSlot;
use crate::pipeline::ingestion_handler::IngestionHandler;
use crate::pipeline::processing_loop::ProcessingLoop;
use crate::server::infrastructure::http_server::HttpServer;
use crate::shared::config::{BridgeConfig, DeliveryMode};
use crate::shared::shutdown::{self, ShutdownTrigger};
use crate::video::domain::image_writer::ImageWriter;

/// The pluggable collaborators the bridge is assembled from.
pub struct BridgeParts {
    pub device: Arc<dyn RemoteDevice>,
    pub detector: Box<dyn FaceDetector>,
    pub annotator: Box<dyn FrameAnnotator>,
    pub writer: Box<dyn ImageWriter>,
    pub logger: Box<dyn CycleLogger>,
}

/// Runs the bridge on plain OS threads.
///
/// Layout: `acquisition` and `processing` each get one thread, the HTTP
/// server a pool of `http_workers`. They share nothing but the frame slot
/// and the shutdown token.
pub struct ThreadedBridge;

impl ThreadedBridge {
    /// Binds the HTTP listener and starts every unit.
    ///
    /// Nothing is spawned if binding fails.
    pub fn start(
        config: &BridgeConfig,
        parts: BridgeParts,
    ) -> Result<RunningBridge, Box<dyn std::error::Error>> {
        let slot = Arc::new(FrameSlot::new());
        let ingestion = Arc::new(IngestionHandler::new(slot.clone(), config.max_payload_bytes));
        let server = HttpServer::bind(
            &config.listen_addr,
            ingestion.clone(),
            &config.output_path,
            config.http_workers,
        )?;
        let local_addr = server.local_addr();

        let (trigger, token) = shutdown::channel();

        let mut acquisition = AcquisitionLoop::new(parts.device.clone(), config.acquisition_interval());
        if config.delivery == DeliveryMode::Pull {
            acquisition = acquisition.with_pull(ingestion);
        }
        let acquisition_handle = {
            let token = token.clone();
            std::thread::spawn(move || acquisition.run(&token))
        };

        let mut processing = ProcessingLoop::new(
            slot.clone(),
            parts.detector,
            parts.annotator,
            parts.writer,
            parts.device,
            &config.output_path,
        )
        .with_params(config.detection)
        .with_wait_timeout(config.ready_timeout())
        .with_logger(parts.logger);
        let processing_handle = {
            let token = token.clone();
            std::thread::spawn(move || {
                processing.run(&token);
                processing
            })
        };

        let http_handles = server.spawn(&token);

        log::info!(
            "Bridge running ({:?} delivery, capture every {:.1}s)",
            config.delivery,
            config.acquisition_interval().as_secs_f64()
        );

        Ok(RunningBridge {
            trigger,
            slot,
            local_addr,
            acquisition: acquisition_handle,
            processing: processing_handle,
            http: http_handles,
        })
    }
}

/// Handle to a started bridge. Dropping it without calling
/// [`RunningBridge::shutdown`] still signals every thread to stop.
pub struct RunningBridge {
    trigger: ShutdownTrigger,
    slot: Arc<FrameSlot>,
    local_addr: Option<SocketAddr>,
    acquisition: JoinHandle<usize>,
    processing: JoinHandle<ProcessingLoop>,
    http: Vec<JoinHandle<usize>>,
}

impl RunningBridge {
    /// Address the HTTP server actually bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Stops all units, waits for them and logs the cycle summary.
    ///
    /// Fails if any thread panicked.
    pub fn shutdown(mut self) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Shutting down");
        self.trigger.trigger();

        let mut first_error: Option<Box<dyn std::error::Error>> = None;
        let mut set_if_none = |err: Box<dyn std::error::Error>| {
            if first_error.is_none() {
                first_error = Some(err);
            }
        };

        if self.acquisition.join().is_err() {
            set_if_none("Acquisition thread panicked".into());
        }

        match self.processing.join() {
            Ok(processing) => processing.summary(),
            Err(_) => set_if_none("Processing thread panicked".into()),
        }

        let mut served = 0;
        for handle in self.http {
            match handle.join() {
                Ok(n) => served += n,
                Err(_) => set_if_none("HTTP worker panicked".into()),
            }
        }
        log::info!("HTTP server stopped after {served} requests");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
