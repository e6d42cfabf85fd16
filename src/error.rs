//! Error types for the capture and streaming pipeline

use std::io;

use thiserror::Error;

use crate::controller::CaptureState;

/// Result type alias using [`CaptureError`]
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors raised by the capture device, the capture loop and stream sessions.
///
/// Only `DeviceUnavailable` ever reaches an HTTP caller as a failure. Read
/// failures stay inside the capture loop and disconnects stay inside the
/// session that hit them.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device could not be opened or configured
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single read returned no frame
    #[error("transient read failure: {0}")]
    TransientReadFailure(String),

    /// The stream consumer went away mid-stream
    #[error("consumer disconnected")]
    ConsumerDisconnected,

    /// Requested transition does not apply in the current state
    #[error("invalid state for operation: {0:?}")]
    InvalidState(CaptureState),

    /// JPEG encoding or raw frame decoding failed
    #[error("codec error: {0}")]
    Encode(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
