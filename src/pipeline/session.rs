//! Per-consumer stream session: poll the slot, encode, emit multipart parts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::slot::{FrameSlot, Snapshot};
use crate::controller::CaptureState;
use crate::encode::{encode_jpeg, multipart_part};
use crate::error::{CaptureError, Result};
use crate::telemetry::STREAM_SESSIONS;
use crate::StreamConfig;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One consumer's independent read/encode/emit loop.
///
/// Emits at its own cadence regardless of the capture rate: the newest frame
/// is re-sent when capture is slower and intermediate frames are skipped
/// when it is faster. Nothing is shared with other sessions except the slot.
pub struct StreamSession {
    id: u64,
    slot: Arc<FrameSlot>,
    state: watch::Receiver<CaptureState>,
    period: Duration,
    quality: u8,
    boundary: Arc<str>,
    last_sequence: u64,
    last_part: Option<Bytes>,
}

impl StreamSession {
    pub fn new(
        slot: Arc<FrameSlot>,
        state: watch::Receiver<CaptureState>,
        fps: u32,
        config: &StreamConfig,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            slot,
            state,
            period: Duration::from_secs(1) / fps.max(1),
            quality: config.jpeg_quality,
            boundary: Arc::from(config.boundary.as_str()),
            last_sequence: 0,
            last_part: None,
        }
    }

    /// Run on the runtime, returning the stream of parts to send.
    ///
    /// Dropping the returned stream disconnects the session.
    pub fn spawn(self) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let id = self.id;
            match self.run(tx).await {
                Ok(()) => debug!(session = id, "Stream session ended: camera stopped"),
                Err(CaptureError::ConsumerDisconnected) => {
                    debug!(session = id, "Stream session ended: client disconnected");
                }
                Err(err) => warn!(session = id, "Stream session ended: {}", err),
            }
        });
        ReceiverStream::new(rx)
    }

    /// Emit parts into `sink` until the camera leaves `Running` (`Ok`) or
    /// the sink closes (`ConsumerDisconnected`).
    pub async fn run(mut self, sink: mpsc::Sender<Bytes>) -> Result<()> {
        let _active = ActiveSession::enter(self.id);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.state.wait_for(|s| *s != CaptureState::Running) => return Ok(()),
                () = sink.closed() => return Err(CaptureError::ConsumerDisconnected),
            }

            let Some(snapshot) = self.slot.snapshot() else {
                continue;
            };
            let Some(part) = self.part_for(&snapshot).await? else {
                continue;
            };

            tokio::select! {
                sent = sink.send(part) => {
                    if sent.is_err() {
                        return Err(CaptureError::ConsumerDisconnected);
                    }
                }
                _ = self.state.wait_for(|s| *s != CaptureState::Running) => return Ok(()),
            }
        }
    }

    /// Encoded part for `snapshot`, reusing the last one when nothing new
    /// has been published. `None` if the snapshot is older than what this
    /// session already sent.
    async fn part_for(&mut self, snapshot: &Snapshot) -> Result<Option<Bytes>> {
        if snapshot.sequence < self.last_sequence {
            return Ok(None);
        }
        if snapshot.sequence == self.last_sequence {
            if let Some(part) = &self.last_part {
                return Ok(Some(part.clone()));
            }
        }

        let frame = snapshot.frame.clone();
        let quality = self.quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| CaptureError::Encode(e.to_string()))??;

        let part = multipart_part(&self.boundary, &jpeg);
        self.last_sequence = snapshot.sequence;
        self.last_part = Some(part.clone());
        Ok(Some(part))
    }
}

/// Tracks live sessions in the `camstream_stream_sessions` gauge
struct ActiveSession;

impl ActiveSession {
    fn enter(id: u64) -> Self {
        debug!(session = id, "Stream session started");
        metrics::gauge!(STREAM_SESSIONS).increment(1.0);
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        metrics::gauge!(STREAM_SESSIONS).decrement(1.0);
    }
}
