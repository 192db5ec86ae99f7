use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

pub const DEFAULT_MARKER_COLOR: [u8; 3] = [0, 0, 255];
pub const DEFAULT_MARKER_THICKNESS: u32 = 2;

/// Draws a hollow rectangle around each face.
///
/// Strokes grow inward from the face edge and are clipped to the frame.
/// Grayscale frames receive the colour's luma.
pub struct RectangleMarker {
    color: [u8; 3],
    thickness: u32,
}

impl RectangleMarker {
    pub fn new(color: [u8; 3], thickness: u32) -> Self {
        Self {
            color,
            thickness: thickness.max(1),
        }
    }
}

impl Default for RectangleMarker {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_COLOR, DEFAULT_MARKER_THICKNESS)
    }
}

impl FrameAnnotator for RectangleMarker {
    fn annotate(
        &self,
        frame: &mut Frame,
        faces: &[FaceRect],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let fw = frame.width();
        let fh = frame.height();
        let channels = frame.channels() as usize;
        let value = pixel_value(self.color, channels)?;
        let data = frame.data_mut();

        for face in faces {
            if face.x >= fw || face.y >= fh {
                continue;
            }
            let right = face.right().min(fw);
            let bottom = face.bottom().min(fh);
            let t = self.thickness;

            let mut fill = |x0: u32, y0: u32, x1: u32, y1: u32| {
                for y in y0..y1 {
                    let row = (y * fw) as usize;
                    for x in x0..x1 {
                        let offset = (row + x as usize) * channels;
                        data[offset..offset + channels].copy_from_slice(&value[..channels]);
                    }
                }
            };

            // top, bottom, left, right strokes
            fill(face.x, face.y, right, (face.y + t).min(bottom));
            fill(face.x, bottom.saturating_sub(t).max(face.y), right, bottom);
            fill(face.x, face.y, (face.x + t).min(right), bottom);
            fill(right.saturating_sub(t).max(face.x), face.y, right, bottom);
        }
        Ok(())
    }
}

fn pixel_value(color: [u8; 3], channels: usize) -> Result<[u8; 3], Box<dyn std::error::Error>> {
    match channels {
        3 => Ok(color),
        1 => {
            let [r, g, b] = color.map(u32::from);
            let luma = ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8;
            Ok([luma, luma, luma])
        }
        n => Err(format!("cannot annotate a frame with {n} channels").into()),
    }
}
