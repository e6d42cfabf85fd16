pub mod decoder;
pub mod device;
pub mod frame;
pub mod test_pattern;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use device::{opener_for, CaptureDevice, DeviceOpener, GrantedFormat};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use test_pattern::TestPatternDevice;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Capture;
