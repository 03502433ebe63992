//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// Buffers the driver fills while nobody dequeues; they hold stale frames.
const STALE_BUFFERS: usize = STREAM_BUFFERS as usize - 1;
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB (3 bytes/pixel).
    Rgb3,
}

/// V4L2 camera with one mmap stream that lives as long as the handle.
///
/// Warmup frames and captures are dequeued from the same stream, so frames
/// skipped while auto-exposure settles actually precede the captured one.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") for video-only capture.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV at 640x480; the driver may hand back RGB3 or a
        // different size, and whatever it negotiates is the native resolution.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb3
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or RGB3)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        Ok(Self {
            stream,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Start streaming and drop `count` frames so auto-exposure can settle.
    ///
    /// At least one frame is pulled so the stream is live afterwards.
    pub fn warm_up(&mut self, count: usize) -> Result<(), CameraError> {
        discard(&mut self.stream, count.max(1))
    }

    /// Capture the current frame as RGB at native resolution.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, sequence) = latest(&mut self.stream)?;
        let image = buf_to_rgb(buf, self.pixel_format, self.width, self.height)?;
        Ok(Frame { image, sequence })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Raw buffers from a running capture stream.
trait FrameSource {
    /// Dequeue the next filled buffer with its sequence number.
    fn next_frame(&mut self) -> io::Result<(&[u8], u32)>;
}

impl FrameSource for MmapStream<'static> {
    fn next_frame(&mut self) -> io::Result<(&[u8], u32)> {
        let (buf, meta) = CaptureStream::next(self)?;
        Ok((buf, meta.sequence))
    }
}

fn discard<S: FrameSource>(source: &mut S, count: usize) -> Result<(), CameraError> {
    for _ in 0..count {
        let (_, seq) = source.next_frame().map_err(dequeue_error)?;
        tracing::trace!(seq, "discarded frame");
    }
    Ok(())
}

/// The newest frame: buffers queued while idle are dropped first.
fn latest<S: FrameSource>(source: &mut S) -> Result<(&[u8], u32), CameraError> {
    discard(source, STALE_BUFFERS)?;
    source.next_frame().map_err(dequeue_error)
}

fn dequeue_error(e: io::Error) -> CameraError {
    CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
}

fn buf_to_rgb(
    buf: &[u8],
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<image::RgbImage, CameraError> {
    let converted = match pixel_format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Rgb3 => frame::rgb24_to_image(buf, width, height),
    };
    converted
        .map_err(|e| CameraError::CaptureFailed(format!("{pixel_format:?} conversion failed: {e}")))
}

/// Classify a failure to open the device node.
fn open_error(device_path: &str, e: io::Error) -> CameraError {
    let msg = e.to_string();
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied(format!("{device_path}: {e}"))
    } else if msg.contains("busy") || msg.contains("EBUSY") {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{device_path}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts dequeues and hands out increasing sequence numbers, like one
    /// continuously running stream.
    struct CountingStream {
        next_seq: u32,
        buf: Vec<u8>,
        fail_after: Option<u32>,
    }

    impl CountingStream {
        fn new(width: u32, height: u32) -> Self {
            Self {
                next_seq: 0,
                buf: vec![128; (width * height * 2) as usize],
                fail_after: None,
            }
        }
    }

    impl FrameSource for CountingStream {
        fn next_frame(&mut self) -> io::Result<(&[u8], u32)> {
            if self.fail_after.is_some_and(|n| self.next_seq >= n) {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF"));
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            Ok((&self.buf, seq))
        }
    }

    #[test]
    fn test_capture_follows_warmup_on_same_stream() {
        let mut stream = CountingStream::new(4, 2);
        discard(&mut stream, 4).unwrap();

        let (_, seq) = latest(&mut stream).unwrap();
        assert_eq!(seq, 4 + STALE_BUFFERS as u32);
    }

    #[test]
    fn test_consecutive_captures_skip_stale_buffers() {
        let mut stream = CountingStream::new(4, 2);
        let (_, first) = latest(&mut stream).unwrap();
        let (_, second) = latest(&mut stream).unwrap();
        assert_eq!(second - first, STALE_BUFFERS as u32 + 1);
    }

    #[test]
    fn test_latest_buffer_converts_to_rgb() {
        let mut stream = CountingStream::new(4, 2);
        let (buf, _) = latest(&mut stream).unwrap();
        let image = buf_to_rgb(buf, PixelFormat::Yuyv, 4, 2).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
    }

    #[test]
    fn test_dequeue_timeout_is_capture_failure() {
        let mut stream = CountingStream::new(4, 2);
        stream.fail_after = Some(2);
        assert!(discard(&mut stream, 2).is_ok());
        assert!(matches!(latest(&mut stream), Err(CameraError::CaptureFailed(_))));
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist").err().unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_open_error_permission_denied() {
        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            open_error("/dev/video0", e),
            CameraError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_open_error_busy() {
        let e = io::Error::new(io::ErrorKind::Other, "Device or resource busy");
        assert!(matches!(open_error("/dev/video0", e), CameraError::DeviceBusy));
    }
}
