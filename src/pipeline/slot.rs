//! Single-slot latest-frame buffer between the capture loop and stream sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;

use crate::capture::Frame;

/// A published frame tagged with its slot sequence number
#[derive(Debug)]
pub struct Snapshot {
    pub sequence: u64,
    pub frame: Frame,
}

/// Overwrite-on-write slot holding only the newest frame.
///
/// One writer, any number of readers. Publishing swaps an `Arc` in place, so
/// readers either see the previous snapshot or the new one in full and
/// neither side ever waits on the other. There is no queue: a reader that
/// falls behind simply skips to whatever is newest.
#[derive(Default)]
pub struct FrameSlot {
    latest: ArcSwapOption<Snapshot>,

    /// Last sequence handed out, which is also the publish count; survives `clear`
    sequence: CachePadded<AtomicU64>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer: replace the stored frame, returning its sequence number
    pub fn publish(&self, frame: Frame) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.latest.store(Some(Arc::new(Snapshot { sequence, frame })));
        sequence
    }

    /// Consumer: newest snapshot, or `None` before the first publish
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.latest.load_full()
    }

    /// Sequence of the last published frame, 0 if none
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Drop the stored frame so a restarted device never serves a stale one
    pub fn clear(&self) {
        self.latest.store(None);
    }
}
