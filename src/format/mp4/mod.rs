//! # Fragmented MP4 (ISO-BMFF) Construction
//!
//! This module builds the binary payloads served to players:
//!
//! - **Initialization segments**: `ftyp` + `moov` with the movie-extends
//!   box required for fragmented delivery
//! - **Media fragments**: `moof` + `mdat` pairs, emitted either one per
//!   segment or one per sample for chunked low-latency transfer
//! - **Structural parsing**: walking produced payloads back into their
//!   sample tables, used to validate round-trips
//!
//! Boxes are assembled with [`BoxBuilder`], which appends typed fields
//! into a growable buffer and patches each box's length back once its
//! contents are known.

/// Nested box builder with length patch-back
pub mod boxes;

/// Movie-fragment accumulation and chunked emission
pub mod fragment;

/// Initialization segment construction
pub mod init;

/// Structural fragment parsing
pub mod parser;

pub use boxes::BoxBuilder;
pub use fragment::ChunkWriter;
pub use init::InitSegmentWriter;
pub use parser::{FragmentParser, ParsedFragment, ParsedSample};
