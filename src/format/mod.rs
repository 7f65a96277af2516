pub mod cmaf;
pub mod mp4;

pub use self::cmaf::{ChunkedTransferSink, ManifestGenerator, SegmentAssembler, SegmentRecord, SegmentStore};
pub use self::mp4::{ChunkWriter, FragmentParser, InitSegmentWriter};
