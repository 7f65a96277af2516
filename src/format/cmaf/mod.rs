//! # CMAF Low-Latency Packaging
//!
//! This module turns per-track encoded samples into named, sequenced
//! CMAF segments and a live DASH manifest:
//!
//! - **Segment assembly**: per-track boundary decisions, sequence
//!   numbering, retention, and sink notification
//! - **Chunked transfer**: every appended sample is delivered to the
//!   sink as a self-contained chunk before its segment closes
//! - **Manifest generation**: dynamic MPD with per-track availability
//!   time offsets reflecting chunked delivery
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmafio::av::{Sample, TrackKind, VideoParams};
//! use cmafio::config::StreamConfig;
//! use cmafio::format::cmaf::{tests::RecordingSink, SegmentAssembler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::new("app", "stream", "stream")
//!         .with_segment_duration(2.0)
//!         .with_video(VideoParams {
//!             timescale: 90_000,
//!             frame_rate: 30.0,
//!             bitrate: 2_000_000,
//!             width: 1280,
//!             height: 720,
//!             pixel_aspect: "1:1".to_string(),
//!         });
//!     let assembler = SegmentAssembler::new(config, Arc::new(RecordingSink::new()))?;
//!
//!     let frame = Sample::new(vec![0u8; 1024])
//!         .with_pts(0)
//!         .with_duration(180_000)
//!         .with_key_flag(true);
//!     assembler.append_frame(TrackKind::Video, frame)?;
//!     assembler.finalize_segment(TrackKind::Video)?;
//!     println!("{}", assembler.manifest()?);
//!     Ok(())
//! }
//! ```

/// Segment assembly and per-track orchestration
pub mod assembler;

/// Manifest rendering and caching
pub mod manifest;

/// Segment records and retention storage
pub mod segment;

/// Transfer sink interface and delivery queue
pub mod sink;

// File naming
pub const VIDEO_MEDIA_SUFFIX: &str = "_video.m4s";
pub const AUDIO_MEDIA_SUFFIX: &str = "_audio.m4s";
pub const VIDEO_INIT_FILE_NAME: &str = "init_video.m4s";
pub const AUDIO_INIT_FILE_NAME: &str = "init_audio.m4s";

// Codec strings advertised in the manifest
pub const VIDEO_CODECS: &str = "avc1.42401f";
pub const AUDIO_CODECS: &str = "mp4a.40.2";

pub use assembler::SegmentAssembler;
pub use manifest::ManifestGenerator;
pub use segment::{MemorySegmentStore, SegmentRecord, SegmentStore};
pub use sink::ChunkedTransferSink;

pub mod tests {
    use super::segment::{SegmentRecord, SegmentStore};
    use super::sink::ChunkedTransferSink;
    use crate::av::TrackKind;
    use crate::error::{CmafError, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// One recorded in-progress chunk delivery.
    #[derive(Debug, Clone)]
    pub struct ChunkPushRecord {
        pub app_name: String,
        pub stream_name: String,
        pub file_name: String,
        pub is_video: bool,
        pub chunk: Bytes,
    }

    /// A sink that records every notification it receives.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub chunks: Mutex<Vec<ChunkPushRecord>>,
        pub completed: Mutex<Vec<(String, bool)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Polls until `count` completion notices arrived or `timeout`
        /// elapsed; delivery runs on the dispatcher task, so tests must
        /// wait rather than assert immediately.
        pub async fn wait_for_completed(&self, count: usize, timeout: Duration) {
            wait_until(timeout, || self.completed.lock().len() >= count).await;
        }

        pub async fn wait_for_chunks(&self, count: usize, timeout: Duration) {
            wait_until(timeout, || self.chunks.lock().len() >= count).await;
        }
    }

    async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        while !done() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[async_trait]
    impl ChunkedTransferSink for RecordingSink {
        async fn on_chunk_push(
            &self,
            app_name: &str,
            stream_name: &str,
            file_name: &str,
            is_video: bool,
            chunk: Bytes,
        ) {
            self.chunks.lock().push(ChunkPushRecord {
                app_name: app_name.to_string(),
                stream_name: stream_name.to_string(),
                file_name: file_name.to_string(),
                is_video,
                chunk,
            });
        }

        async fn on_segment_complete(
            &self,
            _app_name: &str,
            _stream_name: &str,
            file_name: &str,
            is_video: bool,
        ) {
            self.completed.lock().push((file_name.to_string(), is_video));
        }
    }

    /// A store that rejects every record, for failure-path tests.
    #[derive(Debug)]
    pub struct RejectingStore;

    impl SegmentStore for RejectingStore {
        fn insert(&self, record: SegmentRecord) -> Result<()> {
            Err(CmafError::Storage(format!(
                "segment {} rejected",
                record.file_name
            )))
        }

        fn get(&self, _file_name: &str) -> Option<SegmentRecord> {
            None
        }

        fn count(&self, _kind: TrackKind) -> usize {
            0
        }
    }
}
