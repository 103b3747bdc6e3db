use tracing::info;
use v4l::{
    buffer::Type,
    io::{mmap::Stream as MmapStream, traits::CaptureStream},
    video::Capture,
    Device, Format, FourCC,
};

use super::{Camera, CameraError, PixelFormat, RawFrame};

const BUFFER_COUNT: u32 = 4;

/// V4L2 camera delivering YUYV frames through memory-mapped buffers
pub struct V4lCamera {
    stream: MmapStream<'static>,
    device_id: u32,
    width: u32,
    height: u32,
}

impl V4lCamera {
    pub fn open(device_id: u32, width: u32, height: u32) -> Result<Self, CameraError> {
        let open_err = |reason: String| CameraError::Open {
            device: format!("/dev/video{}", device_id),
            reason,
        };

        let mut device = Device::new(device_id as usize).map_err(|e| open_err(e.to_string()))?;

        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let fmt = device
            .set_format(&requested)
            .map_err(|e| open_err(e.to_string()))?;

        if fmt.fourcc != FourCC::new(b"YUYV") {
            return Err(open_err(format!(
                "driver negotiated {} instead of YUYV",
                fmt.fourcc
            )));
        }
        info!(device = device_id, format = %fmt, "Camera format set");

        let stream = MmapStream::with_buffers(&mut device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| open_err(e.to_string()))?;

        Ok(Self {
            stream,
            device_id,
            width: fmt.width,
            height: fmt.height,
        })
    }
}

impl Camera for V4lCamera {
    fn capture(&mut self) -> Result<Option<RawFrame>, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Read(e.to_string()))?;

        let used = (meta.bytesused as usize).min(buf.len());
        Ok(Some(RawFrame::new(
            buf[..used].to_vec(),
            self.width,
            self.height,
            PixelFormat::Yuyv,
        )))
    }

    fn describe(&self) -> String {
        format!("/dev/video{} {}x{} YUYV", self.device_id, self.width, self.height)
    }
}
