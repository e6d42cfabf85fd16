//! Device lifecycle: start/stop state machine around the capture loop

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::capture::{DeviceOpener, GrantedFormat};
use crate::error::{CaptureError, Result};
use crate::pipeline::{spawn_capture, CaptureHandle, FrameSlot};
use crate::DeviceConfig;

/// Lifecycle of the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Snapshot of the controller for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub is_streaming: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub state: CaptureState,
    /// Sequence of the newest published frame
    pub sequence: u64,
}

/// Owns the capture loop and serializes start/stop transitions.
///
/// `start` and `stop` block (opening a device and joining the capture
/// thread both take time); async callers run them on the blocking pool.
/// `status` and `subscribe` never wait on a transition.
pub struct DeviceController {
    config: DeviceConfig,
    opener: DeviceOpener,
    slot: Arc<FrameSlot>,
    /// Held for the whole of a transition
    capture: Mutex<Option<CaptureHandle>>,
    state: watch::Sender<CaptureState>,
    granted: ArcSwapOption<GrantedFormat>,
}

impl DeviceController {
    pub fn new(config: DeviceConfig, opener: DeviceOpener) -> Self {
        let (state, _) = watch::channel(CaptureState::Stopped);
        Self {
            config,
            opener,
            slot: Arc::new(FrameSlot::new()),
            capture: Mutex::new(None),
            state,
            granted: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Slot the capture loop publishes into
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Watch state transitions; sessions use this to stop with the device
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    /// Open the device and start capturing. No-op when already running.
    #[instrument(skip(self), fields(index = self.config.index))]
    pub fn start(&self) -> Result<DeviceStatus> {
        let mut capture = self.lock_capture();
        if capture.is_some() {
            debug!("{}", CaptureError::InvalidState(self.state()));
            return Ok(self.status());
        }

        self.state.send_replace(CaptureState::Starting);
        match spawn_capture(Arc::clone(&self.opener), self.config.clone(), self.slot()) {
            Ok(handle) => {
                self.granted.store(Some(Arc::new(handle.granted())));
                *capture = Some(handle);
                self.state.send_replace(CaptureState::Running);
                info!("Camera streaming started");
                Ok(self.status())
            }
            Err(err) => {
                self.state.send_replace(CaptureState::Stopped);
                error!("Failed to initialize camera: {}", err);
                Err(err)
            }
        }
    }

    /// Stop capturing and release the device. No-op when already stopped.
    #[instrument(skip(self), fields(index = self.config.index))]
    pub fn stop(&self) -> DeviceStatus {
        let mut capture = self.lock_capture();
        let Some(handle) = capture.take() else {
            debug!("{}", CaptureError::InvalidState(self.state()));
            return self.status();
        };

        // Sessions watch for this and wind down while the thread joins
        self.state.send_replace(CaptureState::Stopping);
        handle.join();
        self.slot.clear();
        self.granted.store(None);
        self.state.send_replace(CaptureState::Stopped);
        info!("Camera streaming stopped");
        self.status()
    }

    /// Current state with the granted format while running, the requested
    /// one otherwise
    pub fn status(&self) -> DeviceStatus {
        let state = self.state();
        let (width, height, fps) = match self.granted.load_full() {
            Some(granted) => (granted.width, granted.height, granted.fps),
            None => (self.config.width, self.config.height, self.config.fps),
        };
        DeviceStatus {
            is_streaming: state == CaptureState::Running,
            width,
            height,
            fps,
            state,
            sequence: self.slot.sequence(),
        }
    }

    fn lock_capture(&self) -> MutexGuard<'_, Option<CaptureHandle>> {
        // A panic mid-transition leaves the handle itself consistent
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        self.stop();
    }
}
