//! V4L2 classroom-camera source.

use log::info;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use super::frame::{yuyv_to_grayscale, CaptureError, FrameSource, RawFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Yuyv,
    Grey,
}

/// Exclusive handle on a V4L2 capture device. Dropping it releases the
/// device; a second open while one is held fails with `Busy`.
pub struct Camera {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a camera by path (e.g. `/dev/video0`) and negotiate a format
    /// the sampler understands.
    pub fn open(device_path: &str) -> Result<Self, CaptureError> {
        if !std::path::Path::new(device_path).exists() {
            return Err(CaptureError::Device(format!(
                "device not found: {device_path}"
            )));
        }

        let device = Device::with_path(device_path).map_err(|err| {
            let text = err.to_string();
            if text.contains("busy") || text.contains("EBUSY") {
                CaptureError::Busy
            } else {
                CaptureError::Device(format!("{device_path}: {err}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|err| CaptureError::Device(format!("query capabilities: {err}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(format!(
                "{device_path} does not support video capture"
            )));
        }

        let mut format = device
            .format()
            .map_err(|err| CaptureError::Device(format!("get format: {err}")))?;
        format.fourcc = FourCC::new(b"YUYV");
        format.width = 640;
        format.height = 480;

        let negotiated = device
            .set_format(&format)
            .map_err(|err| CaptureError::Device(format!("set format: {err}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CaptureError::Device(format!(
                "unsupported pixel format {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        info!(
            "camera {} open at {}x{} ({:?})",
            device_path, negotiated.width, negotiated.height, negotiated.fourcc
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    fn to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CaptureError> {
        match self.pixel_format {
            PixelFormat::Yuyv => yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(CaptureError::Device(format!(
                        "short GREY buffer: expected {pixels} bytes, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
        }
    }
}

impl FrameSource for Camera {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> Result<RawFrame, CaptureError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|err| CaptureError::Device(format!("mmap stream: {err}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|err| CaptureError::Device(format!("dequeue buffer: {err}")))?;

        let data = self.to_grayscale(buf)?;
        Ok(RawFrame {
            data,
            width: self.width,
            height: self.height,
        })
    }
}
