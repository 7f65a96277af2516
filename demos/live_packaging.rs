//! Feeds a synthetic 30 fps video stream through the packetizer and
//! prints every chunk push, segment completion, and the resulting
//! manifest.

use async_trait::async_trait;
use bytes::Bytes;
use cmafio::av::{Sample, TrackKind, VideoParams};
use cmafio::config::StreamConfig;
use cmafio::format::cmaf::{ChunkedTransferSink, SegmentAssembler};
use std::sync::Arc;
use std::time::Duration;

struct PrintSink;

#[async_trait]
impl ChunkedTransferSink for PrintSink {
    async fn on_chunk_push(
        &self,
        app_name: &str,
        stream_name: &str,
        file_name: &str,
        is_video: bool,
        chunk: Bytes,
    ) {
        println!(
            "chunk  {}/{} -> {} ({} bytes, video={})",
            app_name,
            stream_name,
            file_name,
            chunk.len(),
            is_video
        );
    }

    async fn on_segment_complete(
        &self,
        app_name: &str,
        stream_name: &str,
        file_name: &str,
        is_video: bool,
    ) {
        println!(
            "segment {}/{} -> {} (video={})",
            app_name, stream_name, file_name, is_video
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = StreamConfig::new("demo", "camera", "live")
        .with_segment_duration(2.0)
        .with_video(VideoParams {
            timescale: 90_000,
            frame_rate: 30.0,
            bitrate: 2_000_000,
            width: 1280,
            height: 720,
            pixel_aspect: "1:1".to_string(),
        });

    let assembler = SegmentAssembler::new(config, Arc::new(PrintSink))?;

    assembler.write_init_segment(
        TrackKind::Video,
        vec![vec![0x67, 0x42, 0xe0, 0x1e], vec![0x68, 0xce, 0x06, 0xe2]],
    )?;

    // six seconds of synthetic frames; a key frame opens every second
    for i in 0..180i64 {
        let frame = Sample::new(vec![0u8; 512])
            .with_pts(i * 3_000)
            .with_duration(3_000)
            .with_key_flag(i % 30 == 0);
        assembler.append_frame(TrackKind::Video, frame)?;
    }
    assembler.finalize_segment(TrackKind::Video)?;

    println!("{}", assembler.manifest()?);

    // give the dispatcher a moment to drain before tearing down
    tokio::time::sleep(Duration::from_millis(100)).await;
    assembler.shutdown();
    Ok(())
}
