use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Full recognized text for one image. The engine owns any finer structure
/// (boxes, confidences); the pipeline only consumes the flattened text.
#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
}

/// External text-recognition collaborator. One image per call, asynchronous,
/// may fail. There is no timeout on this call; a hung engine hangs the pass.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        image: &PendingImage,
        language: &str,
    ) -> anyhow::Result<RecognizedText>;
}

/// An image payload queued for the next extraction pass. Never persisted;
/// the queue is dropped once a pass terminates, success or failure.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub id: Uuid,
    pub name: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub queued_at: DateTime<Utc>,
}

impl PendingImage {
    /// Validates that the payload decodes as an image before it is accepted
    /// into the queue, so undecodable files are rejected up front instead of
    /// failing mid-pass inside the engine.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let decoded = image::load_from_memory(&data).map_err(|source| Error::UnreadableImage {
            name: name.clone(),
            source,
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            width: decoded.width(),
            height: decoded.height(),
            name,
            data,
            queued_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    use std::io::Cursor;

    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png fixture");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_decodable_payload() {
        let image = PendingImage::from_bytes("label.png", png_fixture(4, 3)).unwrap();
        assert_eq!(image.width, 4);
        assert_eq!(image.height, 3);
        assert_eq!(image.name, "label.png");
    }

    #[test]
    fn rejects_undecodable_bytes() {
        let err = PendingImage::from_bytes("junk.bin", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::UnreadableImage { .. }));
    }
}
