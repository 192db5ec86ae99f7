use crate::shared::frame::Frame;

/// Decodes an encoded image (JPEG, PNG, BMP, ...) into an RGB frame.
///
/// The format is sniffed from the payload; alpha and palette data are
/// flattened to three channels.
pub fn decode_rgb(payload: &[u8]) -> Result<Frame, image::ImageError> {
    let rgb = image::load_from_memory(payload)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 3))
}

/// Encodes an RGB frame as PNG bytes.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::write_buffer_with_format(
        &mut bytes,
        frame.data(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
        image::ImageFormat::Png,
    )?;
    Ok(bytes.into_inner())
}
