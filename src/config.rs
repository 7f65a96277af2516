use crate::av::{AudioParams, VideoParams};
use crate::error::{CmafError, Result};
use log::warn;
use std::env;

pub const DEFAULT_SEGMENT_DURATION: f64 = 2.0;
pub const DEFAULT_SEGMENT_COUNT: usize = 5;

/// Typed per-stream configuration consumed at assembler construction.
///
/// Values arrive from the external configuration layer with any
/// macro/environment substitution already applied; the operational knobs
/// can additionally be overridden through `CMAFIO_SEGMENT_DURATION` and
/// `CMAFIO_SEGMENT_COUNT`.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub app_name: String,
    pub stream_name: String,
    pub segment_prefix: String,
    /// Target segment duration in seconds.
    pub segment_duration: f64,
    /// Number of finalized segments retained per track.
    pub segment_count: usize,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
}

impl StreamConfig {
    pub fn new(
        app_name: impl Into<String>,
        stream_name: impl Into<String>,
        segment_prefix: impl Into<String>,
    ) -> Self {
        let mut config = Self {
            app_name: app_name.into(),
            stream_name: stream_name.into(),
            segment_prefix: segment_prefix.into(),
            segment_duration: DEFAULT_SEGMENT_DURATION,
            segment_count: DEFAULT_SEGMENT_COUNT,
            video: None,
            audio: None,
        };

        if let Ok(value) = env::var("CMAFIO_SEGMENT_DURATION") {
            match value.parse() {
                Ok(duration) => config.segment_duration = duration,
                Err(_) => warn!("ignoring unparseable CMAFIO_SEGMENT_DURATION {:?}", value),
            }
        }
        if let Ok(value) = env::var("CMAFIO_SEGMENT_COUNT") {
            match value.parse() {
                Ok(count) => config.segment_count = count,
                Err(_) => warn!("ignoring unparseable CMAFIO_SEGMENT_COUNT {:?}", value),
            }
        }

        config
    }

    pub fn with_segment_duration(mut self, duration: f64) -> Self {
        self.segment_duration = duration;
        self
    }

    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }

    pub fn with_video(mut self, params: VideoParams) -> Self {
        self.video = Some(params);
        self
    }

    pub fn with_audio(mut self, params: AudioParams) -> Self {
        self.audio = Some(params);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_prefix.is_empty() {
            return Err(CmafError::Config("segment prefix is empty".into()));
        }
        if !self.segment_duration.is_finite() || self.segment_duration <= 0.0 {
            return Err(CmafError::Config(format!(
                "segment duration {} is not a positive number of seconds",
                self.segment_duration
            )));
        }
        if self.segment_count == 0 {
            return Err(CmafError::Config("segment count is zero".into()));
        }
        if self.video.is_none() && self.audio.is_none() {
            return Err(CmafError::Config("no tracks configured".into()));
        }
        if let Some(video) = &self.video {
            if video.timescale == 0 {
                return Err(CmafError::Config("video timescale is zero".into()));
            }
        }
        if let Some(audio) = &self.audio {
            if audio.timescale == 0 {
                return Err(CmafError::Config("audio timescale is zero".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoParams {
        VideoParams {
            timescale: 90_000,
            frame_rate: 30.0,
            bitrate: 2_000_000,
            width: 1280,
            height: 720,
            pixel_aspect: "1:1".to_string(),
        }
    }

    #[test]
    fn test_defaults_and_builder() {
        let config = StreamConfig::new("app", "stream", "live").with_video(video());

        assert_eq!(config.app_name, "app");
        assert_eq!(config.segment_prefix, "live");
        assert!(config.validate().is_ok());

        let config = config.with_segment_duration(4.0).with_segment_count(3);
        assert_eq!(config.segment_duration, 4.0);
        assert_eq!(config.segment_count, 3);
    }

    #[test]
    fn test_validate_rejects_trackless_config() {
        let config = StreamConfig::new("app", "stream", "live");
        assert!(matches!(config.validate(), Err(CmafError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_duration() {
        let config = StreamConfig::new("app", "stream", "live")
            .with_video(video())
            .with_segment_duration(0.0);
        assert!(matches!(config.validate(), Err(CmafError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timescale() {
        let mut params = video();
        params.timescale = 0;
        let config = StreamConfig::new("app", "stream", "live").with_video(params);
        assert!(matches!(config.validate(), Err(CmafError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let config = StreamConfig::new("app", "stream", "").with_video(video());
        assert!(matches!(config.validate(), Err(CmafError::Config(_))));
    }
}
