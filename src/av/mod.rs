#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn is_video(&self) -> bool {
        matches!(self, TrackKind::Video)
    }
}

/// Static encoding parameters of a video track.
#[derive(Debug, Clone)]
pub struct VideoParams {
    pub timescale: u32,
    pub frame_rate: f64,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_aspect: String,
}

/// Static encoding parameters of an audio track.
#[derive(Debug, Clone)]
pub struct AudioParams {
    pub timescale: u32,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub channels: u16,
}

/// Per-track encoding description, fixed for the stream lifetime.
///
/// The set of kinds is closed: every track is either video or audio,
/// with kind-specific fields carried in the matching variant.
#[derive(Debug, Clone)]
pub enum TrackDescriptor {
    Video(VideoParams),
    Audio(AudioParams),
}

impl TrackDescriptor {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackDescriptor::Video(_) => TrackKind::Video,
            TrackDescriptor::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn timescale(&self) -> u32 {
        match self {
            TrackDescriptor::Video(params) => params.timescale,
            TrackDescriptor::Audio(params) => params.timescale,
        }
    }

    pub fn bitrate(&self) -> u32 {
        match self {
            TrackDescriptor::Video(params) => params.bitrate,
            TrackDescriptor::Audio(params) => params.bitrate,
        }
    }

    /// Converts a timestamp in this track's timescale to seconds.
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        let timescale = self.timescale();
        if timescale == 0 {
            return 0.0;
        }
        ticks as f64 / timescale as f64
    }
}

mod sample;
pub use sample::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_accessors() {
        let video = TrackDescriptor::Video(VideoParams {
            timescale: 90_000,
            frame_rate: 30.0,
            bitrate: 2_000_000,
            width: 1280,
            height: 720,
            pixel_aspect: "1:1".to_string(),
        });

        assert_eq!(video.kind(), TrackKind::Video);
        assert!(video.kind().is_video());
        assert_eq!(video.timescale(), 90_000);
        assert_eq!(video.bitrate(), 2_000_000);
        assert!((video.ticks_to_secs(45_000) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_timescale_conversion() {
        let audio = TrackDescriptor::Audio(AudioParams {
            timescale: 0,
            sample_rate: 48_000,
            bitrate: 128_000,
            channels: 2,
        });

        assert_eq!(audio.ticks_to_secs(1000), 0.0);
    }

    #[test]
    fn test_sample_builder() {
        let sample = Sample::new(vec![1u8, 2, 3])
            .with_pts(9000)
            .with_duration(3000)
            .with_key_flag(true);

        assert_eq!(sample.pts, 9000);
        assert_eq!(sample.duration, 3000);
        assert!(sample.is_key);
        assert_eq!(sample.size(), 3);
    }
}
