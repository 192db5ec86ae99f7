use serde::{Deserialize, Serialize};

/// A detected face in image pixel coordinates.
///
/// Always non-degenerate: `width` and `height` are at least one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "w")]
    pub width: u32,
    #[serde(rename = "h")]
    pub height: u32,
}

impl FaceRect {
    /// Returns `None` for zero-sized rectangles.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Builds a rectangle from floating-point corners, clamped to the frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn from_corners(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        let left = x1.round().clamp(0.0, fw);
        let top = y1.round().clamp(0.0, fh);
        let right = x2.round().clamp(0.0, fw);
        let bottom = y2.round().clamp(0.0, fh);
        if right <= left || bottom <= top {
            return None;
        }
        Self::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
}

/// Faces found in one processing cycle, in detector order.
///
/// Serializes as a bare JSON array of `{x, y, w, h}` objects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionReport {
    faces: Vec<FaceRect>,
}

impl DetectionReport {
    pub fn new(faces: Vec<FaceRect>) -> Self {
        Self { faces }
    }

    pub fn faces(&self) -> &[FaceRect] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
