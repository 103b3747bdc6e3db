//! JPEG encoding of annotated frames

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("cannot encode empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}

/// Turns an annotated image into stream-ready bytes
pub trait FrameEncoder: Send {
    fn encode(&mut self, image: &RgbImage) -> Result<Bytes, EncodeError>;
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn encode(&mut self, image: &RgbImage) -> Result<Bytes, EncodeError> {
        (**self).encode(image)
    }
}

/// Baseline JPEG at a fixed quality
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    quality: u8,
    // Reused between frames to avoid reallocating
    buffer: Vec<u8>,
}

impl JpegEncoder {
    /// Quality is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            buffer: Vec::new(),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Bytes, EncodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EncodeError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        self.buffer.clear();
        ImageJpegEncoder::new_with_quality(&mut self.buffer, self.quality).encode_image(image)?;
        Ok(Bytes::copy_from_slice(&self.buffer))
    }
}
