use crate::av::TrackKind;
use crate::error::{CmafError, Result};
use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One finalized, externally addressable media segment.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub kind: TrackKind,
    pub sequence_number: u32,
    pub file_name: String,
    /// Start timestamp in the track's timescale.
    pub start_timestamp: i64,
    /// Duration in the track's timescale.
    pub duration: u64,
    pub data: Bytes,
}

/// Persistence seam for finalized segments.
///
/// An implementation may reject a record; the assembler treats that as a
/// deliberate loss of the fragment and keeps going.
pub trait SegmentStore: Send + Sync {
    fn insert(&self, record: SegmentRecord) -> Result<()>;
    fn get(&self, file_name: &str) -> Option<SegmentRecord>;
    fn count(&self, kind: TrackKind) -> usize;
}

/// In-memory store keeping a bounded window of segments per track.
/// Records past the retention window are evicted oldest-first, never
/// rewritten.
#[derive(Debug)]
pub struct MemorySegmentStore {
    retain: usize,
    video: Mutex<VecDeque<SegmentRecord>>,
    audio: Mutex<VecDeque<SegmentRecord>>,
}

impl MemorySegmentStore {
    pub fn new(retain: usize) -> Self {
        Self {
            retain,
            video: Mutex::new(VecDeque::new()),
            audio: Mutex::new(VecDeque::new()),
        }
    }

    fn queue(&self, kind: TrackKind) -> &Mutex<VecDeque<SegmentRecord>> {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }
}

impl SegmentStore for MemorySegmentStore {
    fn insert(&self, record: SegmentRecord) -> Result<()> {
        if self.retain == 0 {
            return Err(CmafError::Storage(
                "segment retention window is zero".into(),
            ));
        }

        let mut queue = self.queue(record.kind).lock();
        queue.push_back(record);
        while queue.len() > self.retain {
            if let Some(evicted) = queue.pop_front() {
                debug!("evicting segment {} from retention window", evicted.file_name);
            }
        }
        Ok(())
    }

    fn get(&self, file_name: &str) -> Option<SegmentRecord> {
        for kind in [TrackKind::Video, TrackKind::Audio] {
            let queue = self.queue(kind).lock();
            if let Some(record) = queue.iter().find(|r| r.file_name == file_name) {
                return Some(record.clone());
            }
        }
        None
    }

    fn count(&self, kind: TrackKind) -> usize {
        self.queue(kind).lock().len()
    }
}
