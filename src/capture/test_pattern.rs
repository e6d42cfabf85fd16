//! Synthetic colour-bar source for running the pipeline without hardware.

use std::time::{Duration, Instant};

use super::decoder::yuyv_to_rgb;
use super::device::{CaptureDevice, GrantedFormat};
use super::frame::Frame;
use crate::error::{CaptureError, Result};
use crate::DeviceConfig;

/// The synthetic source exposes a single device at this index
pub const TEST_PATTERN_INDEX: u32 = 0;

const MAX_WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 1080;
const MAX_FPS: u32 = 60;

/// SMPTE colour bars in YUV: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

/// Virtual camera producing YUYV colour bars with a sweeping line.
///
/// Frames are paced to the granted rate the way a real driver paces
/// dequeues, and go through the same YUYV decode path as hardware frames.
pub struct TestPatternDevice {
    granted: GrantedFormat,
    frame_count: u64,
    next_due: Instant,
}

impl TestPatternDevice {
    /// Open the virtual device, clamping the request like a driver would
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        if config.index != TEST_PATTERN_INDEX {
            return Err(CaptureError::DeviceUnavailable(format!(
                "camera {}: no such test pattern device",
                config.index
            )));
        }

        // YUYV needs an even width; keep both dimensions on a multiple of 8
        let granted = GrantedFormat {
            width: (config.width.clamp(16, MAX_WIDTH)) & !7,
            height: (config.height.clamp(8, MAX_HEIGHT)) & !7,
            fps: config.fps.clamp(1, MAX_FPS),
        };

        Ok(Self {
            granted,
            frame_count: 0,
            next_due: Instant::now(),
        })
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.granted.fps
    }
}

impl CaptureDevice for TestPatternDevice {
    fn granted(&self) -> GrantedFormat {
        self.granted
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + self.frame_interval();

        let GrantedFormat { width, height, .. } = self.granted;
        #[allow(clippy::cast_possible_truncation)]
        let sweep_row = (self.frame_count % u64::from(height)) as u32;
        self.frame_count += 1;

        let yuyv = color_bars(width, height, sweep_row);
        let rgb = yuyv_to_rgb(&yuyv, width, height, width * 2)?;
        Ok(Frame::rgb(rgb, width, height))
    }
}

/// Generate YUYV colour bars with one black row at `sweep_row`.
fn color_bars(width: u32, height: u32, sweep_row: u32) -> Vec<u8> {
    let bar_width = (width / 8).max(1);
    let mut data = Vec::with_capacity((width * height * 2) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let (y_val, u_val, v_val) = if y == sweep_row {
                (16, 128, 128)
            } else {
                BARS[((x / bar_width) as usize).min(7)]
            };
            data.extend_from_slice(&[y_val, u_val, y_val, v_val]);
        }
    }

    data
}
