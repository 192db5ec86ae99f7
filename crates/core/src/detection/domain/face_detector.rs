use serde::{Deserialize, Serialize};

use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

/// Fixed tuning handed to the detector on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Size step between neighbouring detection scales; must exceed 1.0.
    pub scale_factor: f64,
    /// Similar-scale overlapping candidates a face needs besides its best box.
    pub min_neighbors: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Score threshold for raw candidates (0.0-1.0).
    pub confidence: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 1,
            min_width: 30,
            min_height: 30,
            confidence: 0.5,
        }
    }
}

/// Domain interface for face detection on a single-channel frame.
///
/// Implementations may hold inference sessions or scratch buffers, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        gray: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<FaceRect>, Box<dyn std::error::Error>>;
}
