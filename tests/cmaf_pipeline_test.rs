use async_trait::async_trait;
use bytes::Bytes;
use cmafio::av::{AudioParams, Sample, TrackKind, VideoParams};
use cmafio::config::StreamConfig;
use cmafio::error::CmafError;
use cmafio::format::cmaf::tests::RecordingSink;
use cmafio::format::cmaf::{ChunkedTransferSink, SegmentAssembler};
use cmafio::format::mp4::FragmentParser;
use std::sync::Arc;
use std::time::Duration;

const SEGMENT_DURATION_SECS: f64 = 2.0;
const VIDEO_TIMESCALE: u32 = 1000;
const SINK_WAIT: Duration = Duration::from_secs(2);

fn stream_config() -> StreamConfig {
    StreamConfig::new("app", "stream", "stream")
        .with_segment_duration(SEGMENT_DURATION_SECS)
        .with_segment_count(5)
        .with_video(VideoParams {
            timescale: VIDEO_TIMESCALE,
            frame_rate: 30.0,
            bitrate: 2_000_000,
            width: 1280,
            height: 720,
            pixel_aspect: "1:1".to_string(),
        })
        .with_audio(AudioParams {
            timescale: 1000,
            sample_rate: 48_000,
            bitrate: 128_000,
            channels: 2,
        })
}

fn video_frame(pts: i64, duration: u32, key: bool) -> Sample {
    Sample::new(vec![0x65u8; 128])
        .with_pts(pts)
        .with_duration(duration)
        .with_key_flag(key)
}

fn audio_frame(pts: i64, duration: u32) -> Sample {
    Sample::new(vec![0xafu8; 48])
        .with_pts(pts)
        .with_duration(duration)
        .with_key_flag(true)
}

#[tokio::test]
async fn test_video_segment_sequence_across_boundaries() {
    let sink = Arc::new(RecordingSink::new());
    let assembler = SegmentAssembler::new(stream_config(), sink.clone()).unwrap();

    // 500-tick key frames: cumulative duration crosses 2 s every 4
    // samples, so nine appends finalize exactly two segments
    for i in 0..9 {
        assembler
            .append_frame(TrackKind::Video, video_frame(i * 500, 500, true))
            .unwrap();
    }

    sink.wait_for_completed(2, SINK_WAIT).await;
    let completed = sink.completed.lock().clone();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0], ("stream_1_video.m4s".to_string(), true));
    assert_eq!(completed[1], ("stream_2_video.m4s".to_string(), true));

    let first = assembler.segment("stream_1_video.m4s").unwrap();
    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.start_timestamp, 0);
    assert_eq!(first.duration, 2000);

    let second = assembler.segment("stream_2_video.m4s").unwrap();
    assert_eq!(second.start_timestamp, 2000);
}

#[tokio::test]
async fn test_chunks_concatenate_to_stored_segment() {
    let sink = Arc::new(RecordingSink::new());
    let assembler = SegmentAssembler::new(stream_config(), sink.clone()).unwrap();

    for i in 0..4 {
        assembler
            .append_frame(TrackKind::Video, video_frame(i * 500, 500, i == 0))
            .unwrap();
    }
    assembler.finalize_segment(TrackKind::Video).unwrap();

    sink.wait_for_chunks(4, SINK_WAIT).await;
    let chunks = sink.chunks.lock().clone();
    assert_eq!(chunks.len(), 4);

    let mut concat = Vec::new();
    for chunk in &chunks {
        assert_eq!(chunk.file_name, "stream_1_video.m4s");
        assert_eq!(chunk.app_name, "app");
        assert_eq!(chunk.stream_name, "stream");
        concat.extend_from_slice(&chunk.chunk);
    }

    let record = assembler.segment("stream_1_video.m4s").unwrap();
    assert_eq!(record.data, Bytes::from(concat));

    // structural round-trip: one fragment per chunked sample, original
    // timing and sizes preserved in order
    let fragments = FragmentParser::new(record.data).parse().unwrap();
    assert_eq!(fragments.len(), 4);
    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(fragment.base_time, i as u64 * 500);
        assert_eq!(fragment.samples.len(), 1);
        assert_eq!(fragment.samples[0].size, 128);
        assert_eq!(fragment.samples[0].duration, 500);
    }
}

#[tokio::test]
async fn test_dual_track_manifest_lists_both_tracks() {
    let sink = Arc::new(RecordingSink::new());
    let assembler = SegmentAssembler::new(stream_config(), sink.clone()).unwrap();

    assert!(matches!(assembler.manifest(), Err(CmafError::NotStarted)));

    assembler
        .append_frame(TrackKind::Video, video_frame(0, 500, true))
        .unwrap();
    assembler
        .append_frame(TrackKind::Audio, audio_frame(0, 21))
        .unwrap();
    assembler.finalize_segment(TrackKind::Video).unwrap();

    // only video published so far
    let manifest = assembler.manifest().unwrap();
    assert!(manifest.contains("video/mp4"));
    assert!(!manifest.contains("audio/mp4"));

    assembler.finalize_segment(TrackKind::Audio).unwrap();
    let manifest = assembler.manifest().unwrap();
    assert!(manifest.contains("audio/mp4"));
    assert!(manifest.contains("media=\"stream_$Number$_video.m4s\""));
    assert!(manifest.contains("media=\"stream_$Number$_audio.m4s\""));
    assert!(manifest.contains("type=\"dynamic\""));
    // 2 s - 1/30 for video
    assert!(manifest.contains("availabilityTimeOffset=\"1.967\""));
}

#[tokio::test]
async fn test_audio_only_stream_omits_video() {
    let sink = Arc::new(RecordingSink::new());
    let mut config = stream_config();
    config.video = None;
    let assembler = SegmentAssembler::new(config, sink.clone()).unwrap();

    for i in 0..100 {
        assembler
            .append_frame(TrackKind::Audio, audio_frame(i * 21, 21))
            .unwrap();
    }
    assembler.finalize_segment(TrackKind::Audio).unwrap();

    let manifest = assembler.manifest().unwrap();
    assert!(!manifest.contains("video/mp4"));
    assert!(!manifest.contains("avc1"));
    assert!(manifest.contains("audio/mp4"));

    // a video append is a contract breach on this stream
    assert!(matches!(
        assembler.append_frame(TrackKind::Video, video_frame(0, 500, true)),
        Err(CmafError::Contract(_))
    ));
}

#[tokio::test]
async fn test_init_segments_available_to_delivery_layer() {
    let sink = Arc::new(RecordingSink::new());
    let assembler = SegmentAssembler::new(stream_config(), sink).unwrap();

    assembler
        .write_init_segment(
            TrackKind::Video,
            vec![vec![0x67, 0x42, 0xe0, 0x1e], vec![0x68, 0xce, 0x06, 0xe2]],
        )
        .unwrap();
    assembler.write_init_segment(TrackKind::Audio, Vec::new()).unwrap();

    let video_init = assembler.init_segment(TrackKind::Video).unwrap();
    assert_eq!(&video_init[4..8], b"ftyp");
    assert!(video_init.windows(4).any(|w| w == b"avcC"));

    let audio_init = assembler.init_segment(TrackKind::Audio).unwrap();
    assert!(audio_init.windows(4).any(|w| w == b"esds"));
}

/// A sink that never completes a delivery, exercising the decoupling
/// queue: ingestion must keep making progress regardless.
#[derive(Debug)]
struct StalledSink;

#[async_trait]
impl ChunkedTransferSink for StalledSink {
    async fn on_chunk_push(
        &self,
        _app_name: &str,
        _stream_name: &str,
        _file_name: &str,
        _is_video: bool,
        _chunk: Bytes,
    ) {
        std::future::pending::<()>().await;
    }

    async fn on_segment_complete(
        &self,
        _app_name: &str,
        _stream_name: &str,
        _file_name: &str,
        _is_video: bool,
    ) {
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn test_stalled_sink_never_blocks_ingestion() {
    let assembler = SegmentAssembler::new(stream_config(), Arc::new(StalledSink)).unwrap();

    // far more frames than the notification queue can hold; a 2 s
    // segment closes every 4 frames, so this finalizes 49 segments
    for i in 0..200 {
        assembler
            .append_frame(TrackKind::Video, video_frame(i * 500, 500, true))
            .unwrap();
    }

    // packaging state stays correct even though deliveries are stuck,
    // and the retention window kept only the newest segments
    assert!(assembler.segment("stream_49_video.m4s").is_some());
    assert!(assembler.segment("stream_1_video.m4s").is_none());
    assert!(assembler.manifest().is_ok());
}

#[tokio::test]
async fn test_shutdown_stops_ingestion() {
    let sink = Arc::new(RecordingSink::new());
    let assembler = SegmentAssembler::new(stream_config(), sink).unwrap();

    assembler
        .append_frame(TrackKind::Video, video_frame(0, 500, true))
        .unwrap();
    assembler.shutdown();

    assert!(matches!(
        assembler.append_frame(TrackKind::Video, video_frame(500, 500, false)),
        Err(CmafError::Contract(_))
    ));
    assert!(matches!(
        assembler.finalize_segment(TrackKind::Video),
        Err(CmafError::Contract(_))
    ));
}
