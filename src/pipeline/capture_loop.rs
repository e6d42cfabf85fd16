//! Background capture loop: owns the device and feeds the frame slot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use super::slot::FrameSlot;
use crate::capture::{CaptureDevice, DeviceOpener, GrantedFormat};
use crate::error::{CaptureError, Result};
use crate::telemetry::{FRAMES_CAPTURED, READ_FAILURES};
use crate::DeviceConfig;

/// Pause after a read that produced no frame
pub const READ_BACKOFF: Duration = Duration::from_millis(100);

/// Consecutive failures are logged once, then every this many
const FAILURE_LOG_EVERY: u64 = 50;

/// Capture loop state: the device handle plus where frames go.
///
/// Consecutive read failures are tolerated without limit; only the stop
/// signal ends [`CaptureLoop::run`]. A camera that is briefly busy or
/// re-enumerating resumes streaming on its own.
pub struct CaptureLoop {
    device: Option<Box<dyn CaptureDevice>>,
    granted: GrantedFormat,
    slot: Arc<FrameSlot>,
    backoff: Duration,
}

impl CaptureLoop {
    /// Acquire and configure the device
    #[instrument(skip_all, fields(index = config.index))]
    pub fn open(opener: &DeviceOpener, config: &DeviceConfig, slot: Arc<FrameSlot>) -> Result<Self> {
        let device = opener(config)?;
        let granted = device.granted();
        info!(
            "Camera initialized: {}x{} @ {}fps",
            granted.width, granted.height, granted.fps
        );

        Ok(Self {
            device: Some(device),
            granted,
            slot,
            backoff: READ_BACKOFF,
        })
    }

    /// Override the pause between failed reads
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn granted(&self) -> GrantedFormat {
        self.granted
    }

    /// Read and publish frames until `stop` is set.
    ///
    /// The flag is checked before every read, so shutdown waits for at most
    /// one read call or one backoff.
    pub fn run(&mut self, stop: &AtomicBool) {
        let Some(device) = self.device.as_mut() else {
            warn!("Capture loop started without an open device");
            return;
        };

        let mut failures: u64 = 0;
        while !stop.load(Ordering::Acquire) {
            match device.read_frame() {
                Ok(frame) => {
                    if failures > 0 {
                        info!("Camera recovered after {} failed reads", failures);
                        failures = 0;
                    }
                    let sequence = self.slot.publish(frame);
                    metrics::counter!(FRAMES_CAPTURED).increment(1);
                    if sequence == 1 {
                        debug!("First frame published");
                    }
                }
                Err(err) => {
                    failures += 1;
                    metrics::counter!(READ_FAILURES).increment(1);
                    if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                        warn!("Failed to read frame from camera ({} in a row): {}", failures, err);
                    }
                    thread::sleep(self.backoff);
                }
            }
        }

        debug!("Capture loop observed stop signal");
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!("Camera released");
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to a capture loop running on its own thread
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    granted: GrantedFormat,
}

impl CaptureHandle {
    pub fn granted(&self) -> GrantedFormat {
        self.granted
    }

    /// Ask the loop to exit after its current read
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Signal the loop and wait until it has exited and released the device
    pub fn join(mut self) {
        self.reap();
    }

    fn reap(&mut self) {
        self.signal_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.reap();
    }
}

/// Open the device on a dedicated `capture` thread and start the loop there.
///
/// The device is created, used and dropped on that one thread. Returns once
/// the open has either succeeded or failed; on failure the thread has
/// already exited and nothing is left running.
pub fn spawn_capture(
    opener: DeviceOpener,
    config: DeviceConfig,
    slot: Arc<FrameSlot>,
) -> Result<CaptureHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let (open_tx, open_rx) = flume::bounded::<Result<GrantedFormat>>(1);

    let thread_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name("capture".into())
        .spawn(move || match CaptureLoop::open(&opener, &config, slot) {
            Ok(mut capture) => {
                let _ = open_tx.send(Ok(capture.granted()));
                capture.run(&thread_stop);
                capture.close();
            }
            Err(err) => {
                let _ = open_tx.send(Err(err));
            }
        })?;

    match open_rx.recv() {
        Ok(Ok(granted)) => Ok(CaptureHandle {
            stop,
            thread: Some(thread),
            granted,
        }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(CaptureError::DeviceUnavailable(
                "capture thread exited while opening the device".into(),
            ))
        }
    }
}
