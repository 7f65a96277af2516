#![doc(html_root_url = "https://docs.rs/cmafio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # cmafio - Rust CMAF Packaging Toolkit
//!
//! `cmafio` packages live encoded audio/video frames into
//! standards-compliant CMAF segments for low-latency adaptive streaming.
//! It accumulates per-track samples into ISO-BMFF movie fragments,
//! decides when a segment is complete, and publishes a dynamic DASH
//! manifest whose timing fields reflect chunked early availability.
//!
//! ## Features
//!
//! ### Fragmented MP4 Construction
//! - Initialization segments (`ftyp`+`moov`) for H.264 video and AAC audio
//! - Movie fragments (`moof`+`mdat`) with per-sample timing tables
//! - Chunked emission: each sample becomes a self-contained chunk,
//!   deliverable before its parent segment closes
//!
//! ### Segment Assembly
//! - Duration-based segment boundaries with key-frame alignment for video
//! - Per-track monotonic sequence numbering and file naming
//! - Bounded retention window over finalized segments
//! - Fire-and-forget notifications to the outbound transfer sink
//!
//! ### Manifest Generation
//! - Dynamic (live) MPD with per-track segment templates
//! - `availabilityTimeOffset` computed from frame/sample rate
//! - Cached body with request-time publish timestamps
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cmafio = "0.1.0"
//! ```
//!
//! ### Packaging a Live Stream
//!
//! ```rust,no_run
//! use cmafio::av::{AudioParams, Sample, TrackKind, VideoParams};
//! use cmafio::config::StreamConfig;
//! use cmafio::format::cmaf::{tests::RecordingSink, SegmentAssembler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::new("app", "stream", "live")
//!         .with_segment_duration(2.0)
//!         .with_video(VideoParams {
//!             timescale: 90_000,
//!             frame_rate: 30.0,
//!             bitrate: 2_000_000,
//!             width: 1280,
//!             height: 720,
//!             pixel_aspect: "1:1".to_string(),
//!         })
//!         .with_audio(AudioParams {
//!             timescale: 48_000,
//!             sample_rate: 48_000,
//!             bitrate: 128_000,
//!             channels: 2,
//!         });
//!
//!     // the sink receives chunk pushes and segment completions;
//!     // production code injects the HTTP delivery layer here
//!     let assembler = SegmentAssembler::new(config, Arc::new(RecordingSink::new()))?;
//!
//!     // feed encoded frames as they arrive from the encoder pipeline
//!     let frame = Sample::new(vec![0u8; 4096])
//!         .with_pts(0)
//!         .with_duration(3_000)
//!         .with_key_flag(true);
//!     assembler.append_frame(TrackKind::Video, frame)?;
//!
//!     // the manifest becomes available once a segment is published
//!     assembler.finalize_segment(TrackKind::Video)?;
//!     println!("{}", assembler.manifest()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Core audio/video types
//!   - Track descriptors (closed video/audio variants)
//!   - Sample abstraction for encoded access units
//!
//! - `format`: Container construction and packaging
//!   - Fragmented MP4 box building, init segments, fragment parsing
//!   - CMAF segment assembly, retention, manifest generation
//!
//! - `config`: Typed stream configuration with validation
//!
//! - `error`: Error types and utilities
//!   - Contract violations, storage rejections, and the distinguished
//!     not-yet-started manifest failure

/// Audio/Video base types and utilities
pub mod av;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Media format implementations (fragmented MP4, CMAF)
pub mod format;

pub use error::{CmafError, Result};

// Re-export the packaging entry points for convenience
pub use format::cmaf::{ChunkedTransferSink, SegmentAssembler};
