use std::io::{BufWriter, Write};
use std::path::Path;

use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

/// Writes a frame to an image file using the `image` crate.
///
/// The encoding is picked from the file extension. Output goes to a
/// temporary sibling first and is renamed into place, so a viewer polling
/// the path never reads a half-written image.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let format = image::ImageFormat::from_path(path)?;
        let img = to_dynamic(frame)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Regular file mode (0644 before umask); the rename keeps it.
        let mut builder = tempfile::Builder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o644));
        }
        let mut tmp = builder.tempfile_in(dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            img.write_to(&mut out, format)?;
            out.flush()?;
        }
        tmp.persist(path)?;
        Ok(())
    }
}

fn to_dynamic(frame: &Frame) -> Result<image::DynamicImage, Box<dyn std::error::Error>> {
    let (w, h, data) = (frame.width(), frame.height(), frame.data().to_vec());
    let img = match frame.channels() {
        3 => image::RgbImage::from_raw(w, h, data).map(image::DynamicImage::ImageRgb8),
        1 => image::GrayImage::from_raw(w, h, data).map(image::DynamicImage::ImageLuma8),
        n => return Err(format!("cannot encode a frame with {n} channels").into()),
    };
    img.ok_or_else(|| "Failed to create image from frame data".into())
}
