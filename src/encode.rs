//! JPEG compression and multipart framing for the MJPEG stream

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::capture::{Frame, PixelFormat};
use crate::error::{CaptureError, Result};

/// Quality used for every streamed frame
pub const JPEG_QUALITY: u8 = 85;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Compress an RGB24 frame to JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    if frame.meta.format != PixelFormat::Rgb24 {
        return Err(CaptureError::Encode(format!(
            "expected RGB24 frame, got {:?}",
            frame.meta.format
        )));
    }

    let expected = frame.width() as usize * frame.height() as usize * 3;
    if frame.data.len() != expected {
        return Err(CaptureError::Encode(format!(
            "frame holds {} bytes, {}x{} RGB24 needs {expected}",
            frame.data.len(),
            frame.width(),
            frame.height()
        )));
    }

    let mut out = Vec::with_capacity(frame.data.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(
            &frame.data,
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(out)
}

/// `Content-Type` header value of the streaming response
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// Wrap one JPEG payload as a self-delimited multipart part
pub fn multipart_part(boundary: &str, jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
