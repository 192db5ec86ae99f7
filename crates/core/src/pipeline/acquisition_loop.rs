use std::sync::Arc;
use std::time::Duration;

use crate::device::domain::remote_device::RemoteDevice;
use crate::pipeline::ingestion_handler::IngestionHandler;
use crate::shared::shutdown::ShutdownToken;

/// What one acquisition tick achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The device acknowledged the capture command.
    Requested,
    /// Pull mode: the capture was acknowledged and the photo ingested.
    Ingested { sequence: u64 },
    /// Something failed; already logged.
    Failed,
}

/// Periodically commands the device to capture.
///
/// In push mode the picture arrives later through the ingestion endpoint.
/// With a pull handler attached, each acknowledged capture is followed by a
/// download of the saved photo, which is fed straight to ingestion.
pub struct AcquisitionLoop {
    device: Arc<dyn RemoteDevice>,
    interval: Duration,
    pull: Option<Arc<IngestionHandler>>,
}

impl AcquisitionLoop {
    pub fn new(device: Arc<dyn RemoteDevice>, interval: Duration) -> Self {
        Self {
            device,
            interval,
            pull: None,
        }
    }

    /// Fetch and ingest the saved photo after every acknowledged capture.
    pub fn with_pull(mut self, handler: Arc<IngestionHandler>) -> Self {
        self.pull = Some(handler);
        self
    }

    /// Runs one capture attempt. Never fails; problems are logged.
    pub fn tick(&self) -> TickOutcome {
        if let Err(e) = self.device.request_capture() {
            log::warn!("Capture request failed: {e}");
            return TickOutcome::Failed;
        }
        log::debug!("Capture acknowledged");

        let Some(handler) = &self.pull else {
            return TickOutcome::Requested;
        };
        let payload = match self.device.fetch_saved_photo() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Fetching saved photo failed: {e}");
                return TickOutcome::Failed;
            }
        };
        match handler.ingest(&payload) {
            Ok(sequence) => TickOutcome::Ingested { sequence },
            Err(e) => {
                log::warn!("Saved photo rejected: {e}");
                TickOutcome::Failed
            }
        }
    }

    /// Ticks once per interval until shutdown. Returns the number of ticks.
    pub fn run(&self, shutdown: &ShutdownToken) -> usize {
        log::info!(
            "Acquisition loop started (every {:.1}s)",
            self.interval.as_secs_f64()
        );
        let mut ticks = 0;
        while !shutdown.is_cancelled() {
            self.tick();
            ticks += 1;
            if !shutdown.sleep(self.interval) {
                break;
            }
        }
        log::info!("Acquisition loop stopped after {ticks} ticks");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::domain::remote_device::DeviceError;
    use crate::pipeline::frame_slot::FrameSlot;
    use crate::shared::face_rect::DetectionReport;
    use crate::shared::frame::Frame;
    use crate::shared::shutdown;
    use crate::video::infrastructure::image_decoder::encode_png;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct StubDevice {
        capture_ok: bool,
        photo: Option<Vec<u8>>,
        captures: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl StubDevice {
        fn new(capture_ok: bool, photo: Option<Vec<u8>>) -> Arc<Self> {
            Arc::new(Self {
                capture_ok,
                photo,
                captures: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    fn refused(path: &str) -> DeviceError {
        DeviceError::Status {
            url: path.to_string(),
            status: 500,
            body: String::new(),
        }
    }

    impl RemoteDevice for StubDevice {
        fn request_capture(&self) -> Result<(), DeviceError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            if self.capture_ok {
                Ok(())
            } else {
                Err(refused("/capture"))
            }
        }

        fn fetch_saved_photo(&self) -> Result<Vec<u8>, DeviceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.photo.clone().ok_or_else(|| refused("/saved-photo"))
        }

        fn report_faces(&self, _report: &DetectionReport) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn pull_handler() -> (Arc<FrameSlot>, Arc<IngestionHandler>) {
        let slot = Arc::new(FrameSlot::new());
        (slot.clone(), Arc::new(IngestionHandler::new(slot, 1 << 20)))
    }

    #[test]
    fn test_push_tick_only_requests_capture() {
        let device = StubDevice::new(true, None);
        let acquisition = AcquisitionLoop::new(device.clone(), Duration::from_secs(1));
        assert_eq!(acquisition.tick(), TickOutcome::Requested);
        assert_eq!(device.captures.load(Ordering::SeqCst), 1);
        assert_eq!(device.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_capture_is_swallowed() {
        let device = StubDevice::new(false, None);
        let acquisition = AcquisitionLoop::new(device.clone(), Duration::from_secs(1));
        assert_eq!(acquisition.tick(), TickOutcome::Failed);
        assert_eq!(acquisition.tick(), TickOutcome::Failed);
        assert_eq!(device.captures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pull_tick_ingests_saved_photo() {
        let photo = encode_png(&Frame::filled(12, 10, [9, 9, 9])).unwrap();
        let device = StubDevice::new(true, Some(photo));
        let (slot, handler) = pull_handler();
        let acquisition =
            AcquisitionLoop::new(device.clone(), Duration::from_secs(1)).with_pull(handler);

        let outcome = acquisition.tick();
        let snap = slot.try_take_snapshot().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Ingested {
                sequence: snap.sequence()
            }
        );
        assert_eq!((snap.width(), snap.height()), (12, 10));
    }

    #[test]
    fn test_pull_skips_fetch_when_capture_fails() {
        let device = StubDevice::new(false, Some(vec![1, 2, 3]));
        let (slot, handler) = pull_handler();
        let acquisition =
            AcquisitionLoop::new(device.clone(), Duration::from_secs(1)).with_pull(handler);

        assert_eq!(acquisition.tick(), TickOutcome::Failed);
        assert_eq!(device.fetches.load(Ordering::SeqCst), 0);
        assert!(slot.try_take_snapshot().is_none());
    }

    #[test]
    fn test_pull_with_bad_photo_leaves_slot_empty() {
        let device = StubDevice::new(true, Some(b"garbage".to_vec()));
        let (slot, handler) = pull_handler();
        let acquisition =
            AcquisitionLoop::new(device.clone(), Duration::from_secs(1)).with_pull(handler);

        assert_eq!(acquisition.tick(), TickOutcome::Failed);
        assert!(slot.try_take_snapshot().is_none());
        assert_eq!(slot.pending_signals(), 0);
    }

    #[test]
    fn test_run_keeps_ticking_through_failures() {
        let device = StubDevice::new(false, None);
        let acquisition = AcquisitionLoop::new(device.clone(), Duration::from_millis(5));
        let (mut trigger, token) = shutdown::channel();

        let handle = std::thread::spawn(move || acquisition.run(&token));
        while device.captures.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(2));
        }
        trigger.trigger();
        assert!(handle.join().unwrap() >= 3);
    }

    #[test]
    fn test_run_stops_promptly_on_shutdown() {
        let device = StubDevice::new(true, None);
        let acquisition = AcquisitionLoop::new(device.clone(), Duration::from_secs(60));
        let (mut trigger, token) = shutdown::channel();

        let handle = std::thread::spawn(move || acquisition.run(&token));
        while device.captures.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
        let start = Instant::now();
        trigger.trigger();
        assert_eq!(handle.join().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_run_does_nothing_when_already_cancelled() {
        let device = StubDevice::new(true, None);
        let acquisition = AcquisitionLoop::new(device.clone(), Duration::from_millis(5));
        let (mut trigger, token) = shutdown::channel();
        trigger.trigger();
        assert_eq!(acquisition.run(&token), 0);
        assert_eq!(device.captures.load(Ordering::SeqCst), 0);
    }
}
