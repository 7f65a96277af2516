use crate::error::{CmafError, Result};
use bytes::Bytes;

const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_CTS: u32 = 0x000800;

/// One sample recovered from a fragment's `trun` table and `mdat` payload.
#[derive(Debug, Clone)]
pub struct ParsedSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub data: Bytes,
}

/// One `moof`+`mdat` pair recovered from a fragment payload.
#[derive(Debug, Clone)]
pub struct ParsedFragment {
    pub sequence_number: u32,
    pub base_time: u64,
    pub samples: Vec<ParsedSample>,
}

struct TrafInfo {
    sequence_number: u32,
    base_time: u64,
    entries: Vec<(u32, u32, u32)>, // duration, size, flags
}

/// Structural reader for fragment payloads produced by `ChunkWriter`.
///
/// Walks the top-level box sequence, pairing each `moof` with the `mdat`
/// that follows it; truncated or size-inconsistent boxes are rejected.
#[derive(Debug)]
pub struct FragmentParser {
    data: Bytes,
}

impl FragmentParser {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn parse(&self) -> Result<Vec<ParsedFragment>> {
        let mut fragments = Vec::new();
        let mut pending: Option<TrafInfo> = None;
        let mut pos = 0usize;

        while pos < self.data.len() {
            let (size, fourcc) = read_box_header(&self.data, pos)?;
            let body_start = pos + 8;
            let body_end = pos + size;

            match &fourcc {
                b"styp" => {}
                b"moof" => {
                    pending = Some(parse_moof(&self.data, body_start, body_end)?);
                }
                b"mdat" => {
                    let info = pending.take().ok_or_else(|| {
                        CmafError::Parser("mdat without a preceding moof".into())
                    })?;
                    fragments.push(self.split_mdat(info, body_start, body_end)?);
                }
                _ => {
                    return Err(CmafError::Parser(format!(
                        "unexpected top-level box {:?}",
                        String::from_utf8_lossy(&fourcc)
                    )));
                }
            }

            pos = body_end;
        }

        if pending.is_some() {
            return Err(CmafError::Parser("moof without a trailing mdat".into()));
        }

        Ok(fragments)
    }

    fn split_mdat(&self, info: TrafInfo, start: usize, end: usize) -> Result<ParsedFragment> {
        let mut samples = Vec::with_capacity(info.entries.len());
        let mut offset = start;

        for (duration, size, flags) in info.entries {
            let sample_end = offset + size as usize;
            if sample_end > end {
                return Err(CmafError::Parser(
                    "trun sample sizes overrun the mdat payload".into(),
                ));
            }
            samples.push(ParsedSample {
                duration,
                size,
                flags,
                data: self.data.slice(offset..sample_end),
            });
            offset = sample_end;
        }

        if offset != end {
            return Err(CmafError::Parser(
                "mdat payload longer than the trun sample table".into(),
            ));
        }

        Ok(ParsedFragment {
            sequence_number: info.sequence_number,
            base_time: info.base_time,
            samples,
        })
    }
}

fn read_box_header(data: &Bytes, pos: usize) -> Result<(usize, [u8; 4])> {
    if pos + 8 > data.len() {
        return Err(CmafError::Parser("truncated box header".into()));
    }
    let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
    let fourcc = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
    if size < 8 || pos + size > data.len() {
        return Err(CmafError::Parser(format!(
            "box {:?} size {} inconsistent with buffer",
            String::from_utf8_lossy(&fourcc),
            size
        )));
    }
    Ok((size, fourcc))
}

fn parse_moof(data: &Bytes, start: usize, end: usize) -> Result<TrafInfo> {
    let mut sequence_number = None;
    let mut base_time = None;
    let mut entries = None;
    let mut pos = start;

    while pos < end {
        let (size, fourcc) = read_box_header(data, pos)?;
        let body_start = pos + 8;
        let body_end = pos + size;

        match &fourcc {
            b"mfhd" => {
                if size < 16 {
                    return Err(CmafError::Parser("mfhd too short".into()));
                }
                sequence_number = Some(read_u32(data, body_start + 4));
            }
            b"traf" => {
                let (tfdt, trun) = parse_traf(data, body_start, body_end)?;
                base_time = Some(tfdt);
                entries = Some(trun);
            }
            _ => {}
        }

        pos = body_end;
    }

    match (sequence_number, base_time, entries) {
        (Some(sequence_number), Some(base_time), Some(entries)) => Ok(TrafInfo {
            sequence_number,
            base_time,
            entries,
        }),
        _ => Err(CmafError::Parser(
            "moof missing mfhd, tfdt, or trun".into(),
        )),
    }
}

fn parse_traf(data: &Bytes, start: usize, end: usize) -> Result<(u64, Vec<(u32, u32, u32)>)> {
    let mut base_time = None;
    let mut entries = None;
    let mut pos = start;

    while pos < end {
        let (size, fourcc) = read_box_header(data, pos)?;
        let body_start = pos + 8;
        let body_end = pos + size;

        match &fourcc {
            b"tfdt" => {
                let version = data[body_start];
                base_time = Some(if version == 1 {
                    if size < 20 {
                        return Err(CmafError::Parser("tfdt v1 too short".into()));
                    }
                    read_u64(data, body_start + 4)
                } else {
                    if size < 16 {
                        return Err(CmafError::Parser("tfdt v0 too short".into()));
                    }
                    u64::from(read_u32(data, body_start + 4))
                });
            }
            b"trun" => {
                entries = Some(parse_trun(data, body_start, body_end)?);
            }
            _ => {}
        }

        pos = body_end;
    }

    match (base_time, entries) {
        (Some(base_time), Some(entries)) => Ok((base_time, entries)),
        _ => Err(CmafError::Parser("traf missing tfdt or trun".into())),
    }
}

fn parse_trun(data: &Bytes, start: usize, end: usize) -> Result<Vec<(u32, u32, u32)>> {
    if start + 8 > end {
        return Err(CmafError::Parser("trun too short".into()));
    }
    let flags = read_u32(data, start) & 0x00ff_ffff;
    let sample_count = read_u32(data, start + 4) as usize;
    let mut pos = start + 8;

    if flags & TRUN_DATA_OFFSET != 0 {
        pos += 4;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        pos += 4;
    }

    let mut entries = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        let mut duration = 0;
        let mut size = 0;
        let mut sample_flags = 0;
        if flags & TRUN_SAMPLE_DURATION != 0 {
            duration = read_checked(data, &mut pos, end)?;
        }
        if flags & TRUN_SAMPLE_SIZE != 0 {
            size = read_checked(data, &mut pos, end)?;
        }
        if flags & TRUN_SAMPLE_FLAGS != 0 {
            sample_flags = read_checked(data, &mut pos, end)?;
        }
        if flags & TRUN_SAMPLE_CTS != 0 {
            read_checked(data, &mut pos, end)?;
        }
        entries.push((duration, size, sample_flags));
    }

    Ok(entries)
}

fn read_checked(data: &Bytes, pos: &mut usize, end: usize) -> Result<u32> {
    if *pos + 4 > end {
        return Err(CmafError::Parser("trun sample table truncated".into()));
    }
    let value = read_u32(data, *pos);
    *pos += 4;
    Ok(value)
}

fn read_u32(data: &Bytes, pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &Bytes, pos: usize) -> u64 {
    u64::from_be_bytes([
        data[pos],
        data[pos + 1],
        data[pos + 2],
        data[pos + 3],
        data[pos + 4],
        data[pos + 5],
        data[pos + 6],
        data[pos + 7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::Sample;
    use crate::format::mp4::ChunkWriter;

    #[test]
    fn test_round_trip_chunked_segment() {
        let mut writer = ChunkWriter::new(1, 1000, true);
        let payloads: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 10 + i as usize]).collect();

        for (i, payload) in payloads.iter().enumerate() {
            writer
                .append_sample(
                    Sample::new(payload.clone())
                        .with_pts(i as i64 * 500)
                        .with_duration(500)
                        .with_key_flag(i == 0),
                )
                .unwrap();
        }

        let fragments = FragmentParser::new(writer.chunked_segment())
            .parse()
            .unwrap();

        // chunked mode: one fragment per sample, strictly increasing sequence
        assert_eq!(fragments.len(), 4);
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.sequence_number, i as u32 + 1);
            assert_eq!(fragment.base_time, i as u64 * 500);
            assert_eq!(fragment.samples.len(), 1);
            assert_eq!(fragment.samples[0].duration, 500);
            assert_eq!(fragment.samples[0].data, &payloads[i][..]);
        }
    }

    #[test]
    fn test_round_trip_deferred_fragment() {
        let mut writer = ChunkWriter::new(1, 1000, false);
        for i in 0..5 {
            writer
                .append_sample(
                    Sample::new(vec![0xabu8; 20])
                        .with_pts(i * 400)
                        .with_duration(400)
                        .with_key_flag(i == 0),
                )
                .unwrap();
        }

        let fragments = FragmentParser::new(writer.chunked_segment())
            .parse()
            .unwrap();

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].base_time, 0);
        assert_eq!(fragments[0].samples.len(), 5);
        let sizes: Vec<u32> = fragments[0].samples.iter().map(|s| s.size).collect();
        assert_eq!(sizes, vec![20; 5]);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut writer = ChunkWriter::new(1, 1000, true);
        writer
            .append_sample(Sample::new(vec![1u8; 16]).with_pts(0).with_duration(500))
            .unwrap();
        let segment = writer.chunked_segment();

        let truncated = segment.slice(0..segment.len() - 4);
        assert!(FragmentParser::new(truncated).parse().is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let err = FragmentParser::new(Bytes::from_static(&[0, 0, 0, 2, b'a']))
            .parse()
            .unwrap_err();
        assert!(matches!(err, CmafError::Parser(_)));
    }
}
