//! Device abstraction shared by the V4L2 backend and the synthetic source.

use std::sync::Arc;

use serde::Serialize;

use super::frame::Frame;
use crate::error::Result;
use crate::{DeviceConfig, SourceKind};

/// Format the device actually accepted.
///
/// Drivers clamp or ignore requests silently, so this is read back after
/// configuration rather than copied from [`DeviceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantedFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// An open, configured capture device.
///
/// Implementations release the underlying handle on drop.
pub trait CaptureDevice {
    /// Format granted when the device was opened.
    fn granted(&self) -> GrantedFormat;

    /// Block until the next frame is available.
    ///
    /// `TransientReadFailure` means no frame this time; callers retry.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Opens and configures a device for the given request.
///
/// Runs on the capture thread, so the device itself never needs to be `Send`.
pub type DeviceOpener =
    Arc<dyn Fn(&DeviceConfig) -> Result<Box<dyn CaptureDevice>> + Send + Sync>;

/// Pick the opener for a configured source.
pub fn opener_for(kind: SourceKind) -> DeviceOpener {
    match kind {
        SourceKind::TestPattern => Arc::new(|config: &DeviceConfig| {
            Ok(Box::new(super::TestPatternDevice::open(config)?) as Box<dyn CaptureDevice>)
        }),
        #[cfg(feature = "v4l2")]
        SourceKind::V4l2 => Arc::new(|config: &DeviceConfig| {
            Ok(Box::new(super::V4l2Capture::open(config)?) as Box<dyn CaptureDevice>)
        }),
        #[cfg(not(feature = "v4l2"))]
        SourceKind::V4l2 => Arc::new(|_: &DeviceConfig| {
            Err(crate::error::CaptureError::DeviceUnavailable(
                "built without V4L2 support".into(),
            ))
        }),
    }
}
