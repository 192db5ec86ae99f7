use std::sync::Arc;

use crate::pipeline::frame_slot::FrameSlot;
use crate::video::infrastructure::image_decoder;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no image payload")]
    EmptyPayload,
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("undecodable image payload")]
    Undecodable(#[source] image::ImageError),
}

/// Turns delivered image payloads into frames in the shared slot.
///
/// Safe to call from many threads at once: concurrent deliveries are
/// serialized by the slot and the last one wins.
pub struct IngestionHandler {
    slot: Arc<FrameSlot>,
    max_payload_bytes: usize,
}

impl IngestionHandler {
    pub fn new(slot: Arc<FrameSlot>, max_payload_bytes: usize) -> Self {
        Self {
            slot,
            max_payload_bytes,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Decodes `payload` and publishes it. Returns the frame's sequence.
    ///
    /// On error the slot is left untouched.
    pub fn ingest(&self, payload: &[u8]) -> Result<u64, IngestError> {
        if payload.is_empty() {
            return Err(IngestError::EmptyPayload);
        }
        if payload.len() > self.max_payload_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let frame = image_decoder::decode_rgb(payload).map_err(IngestError::Undecodable)?;
        let (w, h) = (frame.width(), frame.height());
        let sequence = self.slot.put(frame);
        log::debug!("Ingested frame #{sequence} ({w}x{h}, {} bytes)", payload.len());
        Ok(sequence)
    }
}
