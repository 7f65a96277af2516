use super::boxes::BoxBuilder;
use crate::av::TrackDescriptor;
use bytes::Bytes;

/// Builds the initialization segment (`ftyp` + `moov` with `mvex`) for
/// one track, served once per stream alongside the media segments.
#[derive(Debug)]
pub struct InitSegmentWriter {
    track: TrackDescriptor,
    track_id: u32,
    // codec private blobs for the sample entry (SPS/PPS for AVC,
    // unused for AAC where the config is derived from the descriptor)
    codec_config: Vec<Vec<u8>>,
}

impl InitSegmentWriter {
    pub fn new(track: TrackDescriptor, track_id: u32) -> Self {
        Self {
            track,
            track_id,
            codec_config: Vec::new(),
        }
    }

    pub fn with_codec_config(mut self, blobs: Vec<Vec<u8>>) -> Self {
        self.codec_config = blobs;
        self
    }

    pub fn build(&self) -> Bytes {
        let mut builder = BoxBuilder::with_capacity(1024);
        self.write_ftyp(&mut builder);
        self.write_moov(&mut builder);
        builder.finish()
    }

    fn write_ftyp(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"ftyp");
        builder.put_slice(b"isom");
        builder.put_u32(512);
        builder.put_slice(b"isom");
        builder.put_slice(b"iso2");
        builder.put_slice(b"mp41");
        if self.track.kind().is_video() {
            builder.put_slice(b"avc1");
        }
        builder.close_box();
    }

    fn write_moov(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"moov");
        self.write_mvhd(builder);
        self.write_trak(builder);
        self.write_mvex(builder);
        builder.close_box();
    }

    fn write_mvhd(&self, builder: &mut BoxBuilder) {
        builder.open_full_box(b"mvhd", 0, 0);
        builder.put_zeroes(8); // creation and modification time
        builder.put_u32(self.track.timescale());
        builder.put_u32(0); // duration unknown for live
        builder.put_u32(0x0001_0000); // rate 1.0
        builder.put_u16(0x0100); // volume 1.0
        builder.put_u16(0);
        builder.put_zeroes(8);
        write_unity_matrix(builder);
        builder.put_zeroes(24); // pre_defined
        builder.put_u32(self.track_id + 1); // next track id
        builder.close_box();
    }

    fn write_trak(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"trak");
        self.write_tkhd(builder);
        self.write_mdia(builder);
        builder.close_box();
    }

    fn write_tkhd(&self, builder: &mut BoxBuilder) {
        // flags: track enabled | in movie | in preview
        builder.open_full_box(b"tkhd", 0, 0x000007);
        builder.put_zeroes(8);
        builder.put_u32(self.track_id);
        builder.put_u32(0);
        builder.put_u32(0); // duration
        builder.put_zeroes(8);
        builder.put_u16(0); // layer
        builder.put_u16(0); // alternate group
        match &self.track {
            TrackDescriptor::Video(_) => builder.put_u16(0),
            TrackDescriptor::Audio(_) => builder.put_u16(0x0100),
        }
        builder.put_u16(0);
        write_unity_matrix(builder);
        match &self.track {
            TrackDescriptor::Video(params) => {
                builder.put_u32(params.width << 16);
                builder.put_u32(params.height << 16);
            }
            TrackDescriptor::Audio(_) => {
                builder.put_u32(0);
                builder.put_u32(0);
            }
        }
        builder.close_box();
    }

    fn write_mdia(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"mdia");

        builder.open_full_box(b"mdhd", 0, 0);
        builder.put_zeroes(8);
        builder.put_u32(self.track.timescale());
        builder.put_u32(0); // duration
        builder.put_u16(0x55c4); // language "und"
        builder.put_u16(0);
        builder.close_box();

        builder.open_full_box(b"hdlr", 0, 0);
        builder.put_u32(0); // pre_defined
        if self.track.kind().is_video() {
            builder.put_slice(b"vide");
            builder.put_zeroes(12);
            builder.put_slice(b"VideoHandler\0");
        } else {
            builder.put_slice(b"soun");
            builder.put_zeroes(12);
            builder.put_slice(b"SoundHandler\0");
        }
        builder.close_box();

        self.write_minf(builder);
        builder.close_box();
    }

    fn write_minf(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"minf");

        if self.track.kind().is_video() {
            builder.open_full_box(b"vmhd", 0, 1);
            builder.put_zeroes(8); // graphics mode + opcolor
            builder.close_box();
        } else {
            builder.open_full_box(b"smhd", 0, 0);
            builder.put_u16(0); // balance
            builder.put_u16(0);
            builder.close_box();
        }

        builder.open_box(b"dinf");
        builder.open_full_box(b"dref", 0, 0);
        builder.put_u32(1); // entry count
        builder.open_full_box(b"url ", 0, 1); // self-contained
        builder.close_box();
        builder.close_box();
        builder.close_box();

        self.write_stbl(builder);
        builder.close_box();
    }

    fn write_stbl(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"stbl");
        self.write_stsd(builder);
        for fourcc in [b"stts", b"stsc"] {
            builder.open_full_box(fourcc, 0, 0);
            builder.put_u32(0);
            builder.close_box();
        }
        builder.open_full_box(b"stsz", 0, 0);
        builder.put_u32(0); // sample size
        builder.put_u32(0); // sample count
        builder.close_box();
        builder.open_full_box(b"stco", 0, 0);
        builder.put_u32(0);
        builder.close_box();
        builder.close_box();
    }

    fn write_stsd(&self, builder: &mut BoxBuilder) {
        builder.open_full_box(b"stsd", 0, 0);
        builder.put_u32(1); // entry count
        match &self.track {
            TrackDescriptor::Video(params) => {
                self.write_avc1_entry(builder, params.width, params.height)
            }
            TrackDescriptor::Audio(params) => {
                write_mp4a_entry(builder, params.sample_rate, params.channels)
            }
        }
        builder.close_box();
    }

    fn write_avc1_entry(&self, builder: &mut BoxBuilder, width: u32, height: u32) {
        builder.open_box(b"avc1");
        builder.put_zeroes(6); // reserved
        builder.put_u16(1); // data reference index
        builder.put_u16(0); // pre_defined
        builder.put_u16(0);
        builder.put_zeroes(12); // pre_defined
        builder.put_u16(width as u16);
        builder.put_u16(height as u16);
        builder.put_u32(0x0048_0000); // 72 dpi
        builder.put_u32(0x0048_0000);
        builder.put_u32(0);
        builder.put_u16(1); // frame count
        builder.put_zeroes(32); // compressor name
        builder.put_u16(0x0018); // depth
        builder.put_u16(0xffff); // pre_defined
        self.write_avcc(builder);
        builder.close_box();
    }

    // avcC carries the decoder configuration: SPS blob first, then PPS blobs.
    fn write_avcc(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"avcC");
        if let Some(sps) = self.codec_config.first() {
            let pps_list = &self.codec_config[1..];
            builder.put_u8(1); // configuration version
            builder.put_u8(sps.get(1).copied().unwrap_or(0)); // profile
            builder.put_u8(sps.get(2).copied().unwrap_or(0)); // compatibility
            builder.put_u8(sps.get(3).copied().unwrap_or(0)); // level
            builder.put_u8(0xff); // 4-byte NALU lengths
            builder.put_u8(0xe0 | 1); // one SPS
            builder.put_u16(sps.len() as u16);
            builder.put_slice(sps);
            builder.put_u8(pps_list.len() as u8);
            for pps in pps_list {
                builder.put_u16(pps.len() as u16);
                builder.put_slice(pps);
            }
        }
        builder.close_box();
    }

    fn write_mvex(&self, builder: &mut BoxBuilder) {
        builder.open_box(b"mvex");
        builder.open_full_box(b"trex", 0, 0);
        builder.put_u32(self.track_id);
        builder.put_u32(1); // default sample description index
        builder.put_u32(0); // default sample duration
        builder.put_u32(0); // default sample size
        builder.put_u32(0x0101_0000); // default sample flags
        builder.close_box();
        builder.close_box();
    }
}

fn write_unity_matrix(builder: &mut BoxBuilder) {
    builder.put_u32(0x0001_0000);
    builder.put_u32(0);
    builder.put_u32(0);
    builder.put_u32(0);
    builder.put_u32(0x0001_0000);
    builder.put_u32(0);
    builder.put_u32(0);
    builder.put_u32(0);
    builder.put_u32(0x4000_0000);
}

fn write_mp4a_entry(builder: &mut BoxBuilder, sample_rate: u32, channels: u16) {
    builder.open_box(b"mp4a");
    builder.put_zeroes(6); // reserved
    builder.put_u16(1); // data reference index
    builder.put_u32(0);
    builder.put_u32(0);
    builder.put_u16(channels);
    builder.put_u16(16); // sample size
    builder.put_u16(0);
    builder.put_u16(0);
    builder.put_u32(sample_rate << 16); // 16.16 fixed
    write_esds(builder, sample_rate, channels);
    builder.close_box();
}

// MPEG-4 elementary stream descriptor for AAC-LC (object type 0x40/2).
fn write_esds(builder: &mut BoxBuilder, sample_rate: u32, channels: u16) {
    let asc = audio_specific_config(sample_rate, channels);

    let mut dec_specific = Vec::with_capacity(2 + asc.len());
    dec_specific.push(0x05);
    dec_specific.push(asc.len() as u8);
    dec_specific.extend_from_slice(&asc);

    let mut dec_config_payload = Vec::new();
    dec_config_payload.push(0x40); // object type: MPEG-4 audio
    dec_config_payload.push(0x15); // stream type: audio, upstream 0
    dec_config_payload.extend_from_slice(&[0x00, 0x00, 0x00]); // buffer size
    dec_config_payload.extend_from_slice(&0u32.to_be_bytes()); // max bitrate
    dec_config_payload.extend_from_slice(&0u32.to_be_bytes()); // avg bitrate
    dec_config_payload.extend_from_slice(&dec_specific);

    let mut es_payload = Vec::new();
    es_payload.extend_from_slice(&1u16.to_be_bytes()); // ES id
    es_payload.push(0); // flags
    es_payload.push(0x04);
    es_payload.push(dec_config_payload.len() as u8);
    es_payload.extend_from_slice(&dec_config_payload);
    es_payload.extend_from_slice(&[0x06, 0x01, 0x02]); // SL config

    builder.open_full_box(b"esds", 0, 0);
    builder.put_u8(0x03);
    builder.put_u8(es_payload.len() as u8);
    builder.put_slice(&es_payload);
    builder.close_box();
}

fn audio_specific_config(sample_rate: u32, channels: u16) -> [u8; 2] {
    let sfi: u8 = match sample_rate {
        96_000 => 0,
        88_200 => 1,
        64_000 => 2,
        48_000 => 3,
        44_100 => 4,
        32_000 => 5,
        24_000 => 6,
        22_050 => 7,
        16_000 => 8,
        12_000 => 9,
        11_025 => 10,
        8_000 => 11,
        7_350 => 12,
        _ => 4,
    };
    // 5 bits object type (2 = AAC-LC), 4 bits frequency index, 4 bits channels
    let object_type: u8 = 2;
    [
        (object_type << 3) | (sfi >> 1),
        ((sfi & 1) << 7) | ((channels as u8 & 0x0f) << 3),
    ]
}
