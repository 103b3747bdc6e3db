//! Camera capture capability and raw frame types

mod convert;
mod test_pattern;
#[cfg(feature = "v4l")]
mod v4l2;

pub use test_pattern::TestPatternCamera;
#[cfg(feature = "v4l")]
pub use v4l2::V4lCamera;

use std::time::SystemTime;

use image::RgbImage;
use thiserror::Error;

use crate::config::{CameraConfig, CameraSource};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height} {format:?}")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("camera capture not supported: {0}")]
    Unsupported(String),
}

/// Pixel layout of a captured buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    /// Packed YUV 4:2:2, two pixels per four bytes
    Yuyv,
}

impl PixelFormat {
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => pixels * 3,
            PixelFormat::Yuyv => pixels * 2,
        }
    }
}

/// Pixel buffer as delivered by the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub captured_at: SystemTime,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            captured_at: SystemTime::now(),
        }
    }

    /// Convert to the RGB layout the detector consumes
    pub fn to_rgb(&self) -> Result<RgbImage, CameraError> {
        let expected = self.format.frame_size(self.width, self.height);
        if self.data.len() < expected {
            return Err(CameraError::BufferSize {
                width: self.width,
                height: self.height,
                format: self.format,
                expected,
                actual: self.data.len(),
            });
        }

        let data = &self.data[..expected];
        let rgb = match self.format {
            PixelFormat::Rgb8 => data.to_vec(),
            PixelFormat::Bgr8 => convert::bgr_to_rgb(data),
            PixelFormat::Yuyv => convert::yuyv_to_rgb(data),
        };

        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| CameraError::BufferSize {
            width: self.width,
            height: self.height,
            format: self.format,
            expected,
            actual: self.data.len(),
        })
    }
}

/// Frame source driven by the detection worker
///
/// `Ok(None)` means the source is exhausted. Errors are final: a camera that
/// failed a read is not retried.
pub trait Camera: Send {
    fn capture(&mut self) -> Result<Option<RawFrame>, CameraError>;

    /// Device description (for logging)
    fn describe(&self) -> String;
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn capture(&mut self) -> Result<Option<RawFrame>, CameraError> {
        (**self).capture()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open the source selected in the configuration
pub fn open(config: &CameraConfig) -> Result<Box<dyn Camera>, CameraError> {
    match config.source {
        CameraSource::TestPattern => Ok(Box::new(TestPatternCamera::new(
            config.width,
            config.height,
            config.fps,
            config.frame_limit,
        ))),
        CameraSource::Device => open_device(config),
    }
}

#[cfg(feature = "v4l")]
fn open_device(config: &CameraConfig) -> Result<Box<dyn Camera>, CameraError> {
    Ok(Box::new(V4lCamera::open(
        config.device_id,
        config.width,
        config.height,
    )?))
}

#[cfg(not(feature = "v4l"))]
fn open_device(config: &CameraConfig) -> Result<Box<dyn Camera>, CameraError> {
    Err(CameraError::Unsupported(format!(
        "camera {} requested but built without V4L2 support, rebuild with --features v4l or use --testPattern",
        config.device_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_frame_to_rgb() {
        let frame = RawFrame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, PixelFormat::Bgr8);
        let rgb = frame.to_rgb().unwrap();
        assert_eq!(rgb.into_raw(), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let frame = RawFrame::new(vec![0; 10], 4, 4, PixelFormat::Rgb8);
        assert!(matches!(
            frame.to_rgb(),
            Err(CameraError::BufferSize { expected: 48, actual: 10, .. })
        ));
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Rgb8.frame_size(640, 480), 921_600);
        assert_eq!(PixelFormat::Yuyv.frame_size(640, 480), 614_400);
    }
}
