use super::manifest::ManifestGenerator;
use super::segment::{MemorySegmentStore, SegmentRecord, SegmentStore};
use super::sink::{ChunkedTransferSink, SinkDispatcher, SinkEvent};
use super::{AUDIO_MEDIA_SUFFIX, VIDEO_MEDIA_SUFFIX};
use crate::av::{Sample, TrackDescriptor, TrackKind};
use crate::config::StreamConfig;
use crate::error::{CmafError, Result};
use crate::format::mp4::{ChunkWriter, InitSegmentWriter};
use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;
const SINK_QUEUE_CAPACITY: usize = 64;

struct TrackState {
    descriptor: TrackDescriptor,
    writer: ChunkWriter,
    // number the open segment will carry; advanced only on a successful
    // finalize, never reused or reset for the stream lifetime
    sequence_number: u32,
    init_segment: Option<Bytes>,
}

/// Orchestrates per-track packetization: routes samples to the track's
/// [`ChunkWriter`], closes segments on the duration boundary, assigns
/// sequence numbers, persists finalized segments, and keeps the manifest
/// and the transfer sink informed.
///
/// Appends for different tracks may run concurrently; state for each
/// track sits behind its own lock so chunk emission and a boundary
/// finalize are atomic with respect to a concurrent append on the same
/// track. Must be constructed inside a tokio runtime (the sink
/// dispatcher task is spawned at construction).
pub struct SegmentAssembler {
    segment_prefix: String,
    segment_duration: f64,
    video: Option<Mutex<TrackState>>,
    audio: Option<Mutex<TrackState>>,
    store: Arc<dyn SegmentStore>,
    manifest: ManifestGenerator,
    dispatcher: SinkDispatcher,
    closed: AtomicBool,
}

impl SegmentAssembler {
    pub fn new(config: StreamConfig, sink: Arc<dyn ChunkedTransferSink>) -> Result<Self> {
        config.validate()?;

        // chunked low-latency delivery: each movie fragment is the segment
        let video = config.video.clone().map(|params| {
            Mutex::new(TrackState {
                writer: ChunkWriter::new(VIDEO_TRACK_ID, params.timescale, true),
                descriptor: TrackDescriptor::Video(params),
                sequence_number: 1,
                init_segment: None,
            })
        });
        let audio = config.audio.clone().map(|params| {
            Mutex::new(TrackState {
                writer: ChunkWriter::new(AUDIO_TRACK_ID, params.timescale, true),
                descriptor: TrackDescriptor::Audio(params),
                sequence_number: 1,
                init_segment: None,
            })
        });

        let manifest = ManifestGenerator::new(&config);
        let dispatcher = SinkDispatcher::spawn(
            config.app_name.clone(),
            config.stream_name.clone(),
            sink,
            SINK_QUEUE_CAPACITY,
        );

        Ok(Self {
            segment_prefix: config.segment_prefix,
            segment_duration: config.segment_duration,
            video,
            audio,
            store: Arc::new(MemorySegmentStore::new(config.segment_count)),
            manifest,
            dispatcher,
            closed: AtomicBool::new(false),
        })
    }

    /// Replaces the default in-memory segment store.
    pub fn with_store(mut self, store: Arc<dyn SegmentStore>) -> Self {
        self.store = store;
        self
    }

    /// Builds and retains the track's initialization segment from its
    /// codec private data (SPS/PPS blobs for video, none for audio).
    pub fn write_init_segment(&self, kind: TrackKind, codec_config: Vec<Vec<u8>>) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.track(kind)?.lock();
        let track_id = track_id(kind);
        let init = InitSegmentWriter::new(state.descriptor.clone(), track_id)
            .with_codec_config(codec_config)
            .build();
        state.init_segment = Some(init);
        Ok(())
    }

    pub fn init_segment(&self, kind: TrackKind) -> Option<Bytes> {
        self.track(kind).ok()?.lock().init_segment.clone()
    }

    /// Routes one encoded frame to its track.
    ///
    /// Crossing the configured segment duration closes the open segment
    /// first; video waits for the next key frame so every segment starts
    /// with a sync sample. Emitted chunks are forwarded to the sink as
    /// in-progress deliveries under the open segment's file name.
    pub fn append_frame(&self, kind: TrackKind, sample: Sample) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.track(kind)?.lock();

        let boundary_reached = state.writer.sample_count() > 0
            && state.writer.duration_secs() >= self.segment_duration
            && (!kind.is_video() || sample.is_key);
        if boundary_reached {
            self.finalize_locked(kind, &mut state)?;
        }

        let pts = sample.pts;
        if let Some(chunk) = state.writer.append_sample(sample)? {
            self.dispatcher.push(SinkEvent::ChunkPush {
                file_name: self.file_name(kind, state.sequence_number),
                is_video: kind.is_video(),
                chunk,
            });
        }
        self.manifest.note_sample(kind, pts);
        Ok(())
    }

    /// Closes the track's open segment, if it holds any samples.
    ///
    /// With nothing accumulated this is a logged no-op success, so
    /// sparse tracks tolerate being flushed on another track's cadence.
    /// A storage rejection is returned as-is: the sequence number is not
    /// advanced and the cleared fragment is accepted as lost.
    pub fn finalize_segment(&self, kind: TrackKind) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.track(kind)?.lock();
        self.finalize_locked(kind, &mut state)
    }

    /// Returns the rendered manifest; fails until the first segment has
    /// been published on some track.
    pub fn manifest(&self) -> Result<String> {
        self.manifest.manifest()
    }

    /// Looks up a finalized segment still inside the retention window.
    pub fn segment(&self, file_name: &str) -> Option<SegmentRecord> {
        self.store.get(file_name)
    }

    /// Tears the stream down: subsequent appends and finalizes fail,
    /// and queued sink notifications become best-effort.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.dispatcher.close();
    }

    fn finalize_locked(&self, kind: TrackKind, state: &mut TrackState) -> Result<()> {
        if state.writer.sample_count() == 0 {
            debug!("no {:?} data accumulated, nothing to finalize", kind);
            return Ok(());
        }

        let start_timestamp = state.writer.start_timestamp().unwrap_or_default();
        let duration = state.writer.accumulated_duration();
        let data = state.writer.chunked_segment();
        state.writer.clear();

        let file_name = self.file_name(kind, state.sequence_number);
        self.store.insert(SegmentRecord {
            kind,
            sequence_number: state.sequence_number,
            file_name: file_name.clone(),
            start_timestamp,
            duration,
            data,
        })?;

        state.sequence_number += 1;
        self.manifest.update(kind, state.sequence_number);
        self.dispatcher.push(SinkEvent::SegmentComplete {
            file_name,
            is_video: kind.is_video(),
        });
        Ok(())
    }

    fn track(&self, kind: TrackKind) -> Result<&Mutex<TrackState>> {
        let slot = match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::Audio => self.audio.as_ref(),
        };
        slot.ok_or_else(|| CmafError::Contract(format!("no {:?} track configured", kind)))
    }

    fn file_name(&self, kind: TrackKind, sequence: u32) -> String {
        let suffix = if kind.is_video() {
            VIDEO_MEDIA_SUFFIX
        } else {
            AUDIO_MEDIA_SUFFIX
        };
        format!("{}_{}{}", self.segment_prefix, sequence, suffix)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CmafError::Contract("stream has been torn down".into()));
        }
        Ok(())
    }
}

fn track_id(kind: TrackKind) -> u32 {
    match kind {
        TrackKind::Video => VIDEO_TRACK_ID,
        TrackKind::Audio => AUDIO_TRACK_ID,
    }
}
