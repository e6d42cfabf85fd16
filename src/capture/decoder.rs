use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::{Frame, PixelFormat};
use crate::error::{CaptureError, Result};

/// Raw buffer as dequeued from the driver
pub struct RawBuffer<'a> {
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per line, as reported by the driver
    pub stride: u32,
}

/// Turn a driver buffer into an RGB24 [`Frame`]
pub fn decode_frame(raw: &RawBuffer<'_>) -> Result<Frame> {
    match raw.format {
        PixelFormat::Mjpeg => decode_mjpeg(raw.data),
        PixelFormat::Rgb24 => {
            let rgb = unpad_rgb24(raw.data, raw.width, raw.height, raw.stride)?;
            Ok(Frame::rgb(rgb, raw.width, raw.height))
        }
        PixelFormat::Yuyv4 => {
            let rgb = yuyv_to_rgb(raw.data, raw.width, raw.height, raw.stride)?;
            Ok(Frame::rgb(rgb, raw.width, raw.height))
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<Frame> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Encode(format!("MJPEG decode failed: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::Encode("MJPEG frame without header".into()))?;

    let (width, height) = (u32::from(info.width), u32::from(info.height));
    let rgb = match info.pixel_format {
        JpegPixelFormat::RGB24 => pixels,
        JpegPixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => {
            return Err(CaptureError::Encode(format!(
                "unsupported MJPEG pixel format: {other:?}"
            )))
        }
    };

    Ok(Frame::rgb(rgb, width, height))
}

/// Copy the visible part of each RGB24 line, dropping driver padding
fn unpad_rgb24(data: &[u8], width: u32, height: u32, stride: u32) -> Result<Vec<u8>> {
    let line = width as usize * 3;
    let height = height as usize;
    let stride = (stride as usize).max(line);

    if data.len() < stride * height.saturating_sub(1) + line {
        return Err(CaptureError::Encode(format!(
            "short RGB24 buffer: {} bytes for {width}x{height}",
            data.len()
        )));
    }
    if stride == line {
        return Ok(data[..line * height].to_vec());
    }

    let mut rgb = Vec::with_capacity(line * height);
    for row in data.chunks(stride).take(height) {
        rgb.extend_from_slice(&row[..line]);
    }
    Ok(rgb)
}

/// Convert packed YUYV 4:2:2 to RGB24
///
/// Each 4-byte group `[Y0 U Y1 V]` yields two pixels sharing U and V, so
/// the width must be even.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(CaptureError::Encode(format!(
            "YUYV width must be even, got {width}"
        )));
    }
    let width = width as usize;
    let height = height as usize;
    let stride = (stride as usize).max(width * 2);

    if data.len() < stride * (height.saturating_sub(1)) + width * 2 {
        return Err(CaptureError::Encode(format!(
            "short YUYV buffer: {} bytes for {width}x{height}",
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in data.chunks(stride).take(height) {
        for quad in row[..width * 2].chunks_exact(4) {
            let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
            let (r, g, b) = yuv_to_rgb(y0, u, v);
            rgb.extend_from_slice(&[r, g, b]);
            let (r, g, b) = yuv_to_rgb(y1, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(rgb)
}

/// ITU-R BT.601 YUV to RGB, clamped to 0-255
#[allow(clippy::many_single_char_names)]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| val.clamp(0.0, 255.0) as u8;

    (clamp(r), clamp(g), clamp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_jpeg;

    #[test]
    fn yuyv_grey_maps_to_grey() {
        // Y=128 with neutral chroma on a 2x1 image
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128], 2, 1, 4).unwrap();
        assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
    }

    #[test]
    fn yuyv_honours_stride_padding() {
        // 2x2 image, 8 bytes per line of which 4 are padding
        let data = [
            16, 128, 16, 128, 0xAA, 0xAA, 0xAA, 0xAA, //
            235, 128, 235, 128, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        let rgb = yuyv_to_rgb(&data, 2, 2, 8).unwrap();
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[..3], &[16, 16, 16]);
        assert_eq!(&rgb[6..9], &[235, 235, 235]);
    }

    #[test]
    fn odd_yuyv_width_is_rejected() {
        let result = decode_frame(&RawBuffer {
            data: &[128; 3 * 2 * 2],
            format: PixelFormat::Yuyv4,
            width: 3,
            height: 2,
            stride: 6,
        });
        assert!(matches!(result, Err(CaptureError::Encode(_))));
    }

    #[test]
    fn rgb24_honours_stride_padding() {
        // 2x2 image, 8 bytes per line of which 2 are padding
        let data = [
            1, 2, 3, 4, 5, 6, 0xAA, 0xAA, //
            7, 8, 9, 10, 11, 12, 0xAA, 0xAA,
        ];
        let frame = decode_frame(&RawBuffer {
            data: &data,
            format: PixelFormat::Rgb24,
            width: 2,
            height: 2,
            stride: 8,
        })
        .unwrap();
        assert_eq!(&frame.data[..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn short_rgb24_buffer_is_rejected() {
        let result = decode_frame(&RawBuffer {
            data: &[0; 10],
            format: PixelFormat::Rgb24,
            width: 2,
            height: 2,
            stride: 6,
        });
        assert!(matches!(result, Err(CaptureError::Encode(_))));
    }

    #[test]
    fn short_yuyv_buffer_is_rejected() {
        assert!(matches!(
            yuyv_to_rgb(&[0; 6], 4, 1, 8),
            Err(CaptureError::Encode(_))
        ));
    }

    #[test]
    fn mjpeg_frames_decode_to_rgb() {
        let source = Frame::rgb(vec![200u8; 16 * 8 * 3], 16, 8);
        let jpeg = encode_jpeg(&source, 90).unwrap();

        let frame = decode_frame(&RawBuffer {
            data: &jpeg,
            format: PixelFormat::Mjpeg,
            width: 0,
            height: 0,
            stride: 0,
        })
        .unwrap();

        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(frame.data.len(), 16 * 8 * 3);
        assert_eq!(frame.meta.format, PixelFormat::Rgb24);
    }

    #[test]
    fn corrupt_mjpeg_is_a_codec_error() {
        let result = decode_frame(&RawBuffer {
            data: &[0xFF, 0xD8, 0x00, 0x01],
            format: PixelFormat::Mjpeg,
            width: 4,
            height: 4,
            stride: 0,
        });
        assert!(matches!(result, Err(CaptureError::Encode(_))));
    }
}
