pub mod capture_loop;
pub mod session;
pub mod slot;

#[cfg(test)]
pub(crate) mod testing;

pub use capture_loop::{spawn_capture, CaptureHandle, CaptureLoop, READ_BACKOFF};
pub use session::StreamSession;
pub use slot::{FrameSlot, Snapshot};
