use super::boxes::{BoxBuilder, SAMPLE_FLAG_NON_SYNC, SAMPLE_FLAG_SYNC};
use crate::av::Sample;
use crate::error::{CmafError, Result};
use bytes::{Bytes, BytesMut};

// tfhd default-base-is-moof
const TFHD_FLAGS: u32 = 0x020000;
// trun: data-offset | sample-duration | sample-size | sample-flags
const TRUN_FLAGS: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400;

/// Accumulates samples for one track into a movie-fragment payload.
///
/// In chunked mode every appended sample is wrapped in its own
/// `moof`+`mdat` pair and returned immediately, so the transfer layer can
/// deliver it before the parent segment closes; the same bytes are also
/// retained so `chunked_segment` can hand back the whole segment later.
/// In non-chunked mode samples are held and written as a single fragment
/// when the segment is taken.
#[derive(Debug)]
pub struct ChunkWriter {
    track_id: u32,
    timescale: u32,
    chunked: bool,
    sequence_number: u32,
    sample_count: u32,
    start_pts: Option<i64>,
    last_pts: Option<i64>,
    accumulated_ticks: u64,
    pending: Vec<Sample>,
    buffer: BytesMut,
}

impl ChunkWriter {
    pub fn new(track_id: u32, timescale: u32, chunked: bool) -> Self {
        Self {
            track_id,
            timescale,
            chunked,
            sequence_number: 1,
            sample_count: 0,
            start_pts: None,
            last_pts: None,
            accumulated_ticks: 0,
            pending: Vec::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Adds one sample to the open fragment.
    ///
    /// Samples must arrive in non-decreasing timestamp order; a violation
    /// is reported without touching accumulated state. Returns the newly
    /// emitted chunk bytes in chunked mode, `None` otherwise.
    pub fn append_sample(&mut self, sample: Sample) -> Result<Option<Bytes>> {
        if let Some(last) = self.last_pts {
            if sample.pts < last {
                return Err(CmafError::Contract(format!(
                    "sample pts {} precedes last appended pts {}",
                    sample.pts, last
                )));
            }
        }

        if self.start_pts.is_none() {
            self.start_pts = Some(sample.pts);
        }
        self.last_pts = Some(sample.pts);
        self.accumulated_ticks += u64::from(sample.duration);
        self.sample_count += 1;

        if self.chunked {
            let include_styp = self.buffer.is_empty();
            let pts = sample.pts;
            let chunk = self.write_fragment(pts, std::slice::from_ref(&sample), include_styp);
            self.buffer.extend_from_slice(&chunk);
            Ok(Some(chunk))
        } else {
            self.pending.push(sample);
            Ok(None)
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Timestamp of the first sample appended since the last `clear`.
    pub fn start_timestamp(&self) -> Option<i64> {
        self.start_pts
    }

    /// Accumulated duration of the open fragment in timescale ticks.
    pub fn accumulated_duration(&self) -> u64 {
        self.accumulated_ticks
    }

    /// Accumulated duration of the open fragment in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.accumulated_ticks as f64 / f64::from(self.timescale)
    }

    /// Sequence number the next emitted fragment header will carry.
    pub fn next_fragment_sequence(&self) -> u32 {
        self.sequence_number
    }

    /// Returns the full fragment payload accumulated since the last
    /// `clear`: the concatenation of every chunk emitted so far. In
    /// non-chunked mode this is where the single deferred fragment is
    /// written.
    pub fn chunked_segment(&mut self) -> Bytes {
        if !self.chunked && !self.pending.is_empty() {
            let samples = std::mem::take(&mut self.pending);
            let base = samples[0].pts;
            let include_styp = self.buffer.is_empty();
            let fragment = self.write_fragment(base, &samples, include_styp);
            self.buffer.extend_from_slice(&fragment);
        }
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Resets accumulated state, starting a new fragment. The fragment
    /// sequence number and timestamp-order watermark carry over.
    pub fn clear(&mut self) {
        self.sample_count = 0;
        self.start_pts = None;
        self.accumulated_ticks = 0;
        self.pending.clear();
        self.buffer.clear();
    }

    fn write_fragment(&mut self, base_time: i64, samples: &[Sample], include_styp: bool) -> Bytes {
        let total_payload: usize = samples.iter().map(Sample::size).sum();
        let mut builder = BoxBuilder::with_capacity(256 + total_payload);

        if include_styp {
            builder.open_box(b"styp");
            builder.put_slice(b"msdh");
            builder.put_u32(0);
            builder.put_slice(b"msdh");
            builder.put_slice(b"dash");
            builder.close_box();
        }

        let moof_start = builder.mark();
        builder.open_box(b"moof");

        builder.open_full_box(b"mfhd", 0, 0);
        builder.put_u32(self.sequence_number);
        builder.close_box();

        builder.open_box(b"traf");

        builder.open_full_box(b"tfhd", 0, TFHD_FLAGS);
        builder.put_u32(self.track_id);
        builder.close_box();

        builder.open_full_box(b"tfdt", 1, 0);
        builder.put_u64(base_time as u64);
        builder.close_box();

        builder.open_full_box(b"trun", 0, TRUN_FLAGS);
        builder.put_u32(samples.len() as u32);
        let data_offset_slot = builder.reserve_u32();
        for sample in samples {
            builder.put_u32(sample.duration);
            builder.put_u32(sample.size() as u32);
            builder.put_u32(if sample.is_key {
                SAMPLE_FLAG_SYNC
            } else {
                SAMPLE_FLAG_NON_SYNC
            });
        }
        builder.close_box();

        builder.close_box(); // traf
        builder.close_box(); // moof

        // data offset points at the first mdat payload byte, moof-relative
        let moof_size = (builder.len() - moof_start) as u32;
        builder.patch_u32(data_offset_slot, moof_size + 8);

        builder.open_box(b"mdat");
        for sample in samples {
            builder.put_slice(&sample.data);
        }
        builder.close_box();

        self.sequence_number += 1;
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pts: i64, duration: u32, key: bool, len: usize) -> Sample {
        Sample::new(vec![0x42u8; len])
            .with_pts(pts)
            .with_duration(duration)
            .with_key_flag(key)
    }

    #[test]
    fn test_chunked_append_emits_chunk() {
        let mut writer = ChunkWriter::new(1, 1000, true);

        let chunk = writer.append_sample(sample(0, 500, true, 32)).unwrap();
        let chunk = chunk.expect("chunked mode must emit a chunk per sample");
        // first chunk of a segment starts with styp, then moof
        assert_eq!(&chunk[4..8], b"styp");
        assert!(chunk.windows(4).any(|w| w == b"moof"));
        assert!(chunk.windows(4).any(|w| w == b"mdat"));

        let next = writer.append_sample(sample(500, 500, false, 16)).unwrap().unwrap();
        assert_eq!(&next[4..8], b"moof");
        assert_eq!(writer.sample_count(), 2);
        assert_eq!(writer.accumulated_duration(), 1000);
        assert_eq!(writer.start_timestamp(), Some(0));
    }

    #[test]
    fn test_chunks_concatenate_to_segment() {
        let mut writer = ChunkWriter::new(1, 1000, true);

        let mut concat = Vec::new();
        for i in 0..3 {
            let chunk = writer
                .append_sample(sample(i * 500, 500, i == 0, 24))
                .unwrap()
                .unwrap();
            concat.extend_from_slice(&chunk);
        }

        assert_eq!(writer.chunked_segment(), Bytes::from(concat));
    }

    #[test]
    fn test_out_of_order_pts_rejected() {
        let mut writer = ChunkWriter::new(1, 1000, true);
        writer.append_sample(sample(1000, 500, true, 8)).unwrap();

        let err = writer.append_sample(sample(900, 500, false, 8)).unwrap_err();
        assert!(matches!(err, CmafError::Contract(_)));
        // rejected sample leaves accumulated state untouched
        assert_eq!(writer.sample_count(), 1);
        assert_eq!(writer.accumulated_duration(), 500);
    }

    #[test]
    fn test_clear_keeps_sequence_and_watermark() {
        let mut writer = ChunkWriter::new(1, 1000, true);
        writer.append_sample(sample(0, 500, true, 8)).unwrap();
        writer.append_sample(sample(500, 500, false, 8)).unwrap();
        assert_eq!(writer.next_fragment_sequence(), 3);

        writer.clear();
        assert_eq!(writer.sample_count(), 0);
        assert_eq!(writer.start_timestamp(), None);
        assert_eq!(writer.accumulated_duration(), 0);
        assert_eq!(writer.next_fragment_sequence(), 3);

        // ordering is enforced across clear
        let err = writer.append_sample(sample(100, 500, true, 8)).unwrap_err();
        assert!(matches!(err, CmafError::Contract(_)));
        assert!(writer.append_sample(sample(1000, 500, true, 8)).unwrap().is_some());
    }

    #[test]
    fn test_non_chunked_defers_until_segment() {
        let mut writer = ChunkWriter::new(1, 1000, false);

        assert!(writer.append_sample(sample(0, 500, true, 8)).unwrap().is_none());
        assert!(writer.append_sample(sample(500, 500, false, 8)).unwrap().is_none());

        let segment = writer.chunked_segment();
        assert_eq!(&segment[4..8], b"styp");
        // exactly one moof over both samples
        assert_eq!(segment.windows(4).filter(|w| w == b"moof").count(), 1);
    }

    #[test]
    fn test_duration_secs() {
        let mut writer = ChunkWriter::new(1, 1000, true);
        writer.append_sample(sample(0, 1500, true, 8)).unwrap();
        assert!((writer.duration_secs() - 1.5).abs() < 1e-9);
    }
}
