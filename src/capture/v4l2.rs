//! V4L2 capture backed by memory-mapped driver buffers

use std::time::Duration;

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder::{decode_frame, RawBuffer};
use super::device::{CaptureDevice, GrantedFormat};
use super::frame::{Frame, PixelFormat};
use crate::error::{CaptureError, Result};
use crate::DeviceConfig;

/// Formats to request, in order of preference
const PREFERRED_FORMATS: [PixelFormat; 3] =
    [PixelFormat::Mjpeg, PixelFormat::Yuyv4, PixelFormat::Rgb24];

/// V4L2 device with a running mmap stream
pub struct V4l2Capture {
    // Dropped before the device
    stream: MmapStream<'static>,
    _device: Device,
    format: PixelFormat,
    stride: u32,
    granted: GrantedFormat,
}

impl V4l2Capture {
    /// Open `/dev/video<index>`, negotiate format and rate, start streaming
    #[instrument(skip(config), fields(index = config.index))]
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let index = config.index;
        let device = Device::new(index as usize).map_err(|e| unavailable(index, e))?;

        let caps = device.query_caps().map_err(|e| unavailable(index, e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(unavailable(index, "device doesn't support video capture"));
        }

        let (fmt, format) = negotiate_format(&device, config)?;

        let params = device
            .set_params(&Parameters::with_fps(config.fps))
            .map_err(|e| unavailable(index, e))?;
        let fps = if params.interval.numerator > 0 {
            params.interval.denominator / params.interval.numerator
        } else {
            config.fps
        };

        let granted = GrantedFormat {
            width: fmt.width,
            height: fmt.height,
            fps,
        };
        if (granted.width, granted.height, granted.fps) != (config.width, config.height, config.fps)
        {
            warn!(
                "Requested {}x{} @ {}fps, device granted {}x{} @ {}fps",
                config.width, config.height, config.fps, granted.width, granted.height, granted.fps
            );
        }

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|e| unavailable(index, e))?;
        stream.set_timeout(Duration::from_millis(config.read_timeout_ms));

        info!(
            "Capture stream started: {}x{} @ {}fps {:?}, {} buffers",
            granted.width, granted.height, granted.fps, format, config.buffer_count
        );

        Ok(Self {
            stream,
            _device: device,
            format,
            stride: fmt.stride,
            granted,
        })
    }
}

impl CaptureDevice for V4l2Capture {
    fn granted(&self) -> GrantedFormat {
        self.granted
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::TransientReadFailure(e.to_string()))?;

        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CaptureError::TransientReadFailure("empty buffer".into()));
        }

        let frame = decode_frame(&RawBuffer {
            data: &buf[..used],
            format: self.format,
            width: self.granted.width,
            height: self.granted.height,
            stride: self.stride,
        })
        .map_err(|e| CaptureError::TransientReadFailure(e.to_string()))?;

        // V4L2 timestamps are never negative in practice
        #[allow(clippy::cast_sign_loss)]
        let ts = Duration::from_secs(meta.timestamp.sec.max(0) as u64)
            + Duration::from_micros(meta.timestamp.usec.max(0) as u64);

        Ok(frame.with_device_timestamp(ts))
    }
}

fn negotiate_format(device: &Device, config: &DeviceConfig) -> Result<(v4l::Format, PixelFormat)> {
    let index = config.index;
    for wanted in PREFERRED_FORMATS {
        let mut fmt = device.format().map_err(|e| unavailable(index, e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(wanted);

        let fmt = device.set_format(&fmt).map_err(|e| unavailable(index, e))?;
        if fmt.fourcc != fourcc(wanted) {
            continue;
        }
        // YUYV packs pixel pairs; an odd line would lose its last pixel
        if wanted == PixelFormat::Yuyv4 && fmt.width % 2 != 0 {
            warn!("Skipping YUYV: granted width {} is odd", fmt.width);
            continue;
        }
        return Ok((fmt, wanted));
    }
    Err(unavailable(
        index,
        "no supported pixel format (MJPG, even-width YUYV, RGB3)",
    ))
}

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
    }
}

fn unavailable(index: u32, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::DeviceUnavailable(format!("camera {index}: {err}"))
}
