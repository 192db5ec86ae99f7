use std::path::Path;

use crate::shared::frame::Frame;

/// Persists a single frame as an image file, replacing any previous file.
pub trait ImageWriter: Send {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
