use thiserror::Error;

use crate::shared::face_rect::DetectionReport;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to encode detection report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The camera endpoint: takes capture commands, exposes its last photo,
/// and receives face coordinates.
///
/// Shared between the acquisition and processing threads, hence `Sync`.
pub trait RemoteDevice: Send + Sync {
    /// Asks the device to take a picture. The image arrives later, out of band.
    fn request_capture(&self) -> Result<(), DeviceError>;

    /// Downloads the most recently captured photo.
    fn fetch_saved_photo(&self) -> Result<Vec<u8>, DeviceError>;

    /// Sends the faces found in one cycle. Callers never send an empty report.
    fn report_faces(&self, report: &DetectionReport) -> Result<(), DeviceError>;
}
