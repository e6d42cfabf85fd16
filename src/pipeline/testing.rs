//! Scripted capture device for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{CaptureDevice, DeviceOpener, Frame, GrantedFormat};
use crate::error::{CaptureError, Result};
use crate::DeviceConfig;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Frame,
    Fail,
    /// Panics inside `read_frame`, as a buggy driver binding might
    Panic,
}

/// Observations shared between a test and the device it scripted
#[derive(Default)]
pub struct Probe {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
    pub reads: AtomicUsize,
}

impl Probe {
    pub fn live_devices(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

/// Plays back `script`, then produces frames every `pace` forever
pub struct ScriptedDevice {
    script: VecDeque<Step>,
    pace: Duration,
    granted: GrantedFormat,
    probe: Arc<Probe>,
}

impl ScriptedDevice {
    pub fn new(script: &[Step], pace: Duration, probe: Arc<Probe>) -> Self {
        probe.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            script: script.iter().copied().collect(),
            pace,
            granted: GrantedFormat {
                width: 8,
                height: 8,
                fps: 30,
            },
            probe,
        }
    }
}

impl CaptureDevice for ScriptedDevice {
    fn granted(&self) -> GrantedFormat {
        self.granted
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front().unwrap_or(Step::Frame) {
            Step::Frame => {
                std::thread::sleep(self.pace);
                Ok(Frame::rgb(vec![0x40; 8 * 8 * 3], 8, 8))
            }
            Step::Fail => Err(CaptureError::TransientReadFailure("scripted".into())),
            Step::Panic => panic!("scripted capture panic"),
        }
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opener that serves scripted devices at index 0 and fails elsewhere
pub fn scripted_opener(script: Vec<Step>, pace: Duration, probe: Arc<Probe>) -> DeviceOpener {
    Arc::new(move |config: &DeviceConfig| {
        if config.index != 0 {
            return Err(CaptureError::DeviceUnavailable(format!(
                "camera {}: not present",
                config.index
            )));
        }
        Ok(Box::new(ScriptedDevice::new(&script, pace, Arc::clone(&probe))) as Box<dyn CaptureDevice>)
    })
}
