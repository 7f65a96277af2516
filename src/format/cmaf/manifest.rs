use super::{AUDIO_CODECS, AUDIO_INIT_FILE_NAME, AUDIO_MEDIA_SUFFIX, VIDEO_CODECS, VIDEO_INIT_FILE_NAME, VIDEO_MEDIA_SUFFIX};
use crate::av::{AudioParams, TrackKind, VideoParams};
use crate::config::StreamConfig;
use crate::error::{CmafError, Result};
use chrono::Utc;
use log::debug;
use parking_lot::RwLock;

const TIME_SHIFT_BUFFER_DEPTH_SECS: f64 = 6.0;
const MINIMUM_UPDATE_PERIOD_SECS: f64 = 30.0;

// request-time substitution markers; everything else in the manifest is
// cached between finalizes
const PUBLISH_TIME_MARKER: &str = "%PUBLISH_TIME%";
const UTC_TIMING_MARKER: &str = "%UTC_NOW%";

#[derive(Debug, Default)]
struct ManifestState {
    started: bool,
    template: String,
    // next segment number per track; 1 means nothing published yet
    video_sequence: u32,
    audio_sequence: u32,
    last_video_pts: Option<i64>,
    last_audio_pts: Option<i64>,
}

/// Renders the current track/segment state into a dynamic DASH manifest.
///
/// The manifest body is re-rendered once per successful segment
/// finalization and cached; only the publish-time fields are recomputed
/// on each [`manifest`](ManifestGenerator::manifest) call.
#[derive(Debug)]
pub struct ManifestGenerator {
    segment_prefix: String,
    segment_duration: f64,
    availability_start_time: String,
    video: Option<VideoParams>,
    audio: Option<AudioParams>,
    state: RwLock<ManifestState>,
}

impl ManifestGenerator {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            segment_prefix: config.segment_prefix.clone(),
            segment_duration: config.segment_duration,
            availability_start_time: utc_second(),
            video: config.video.clone(),
            audio: config.audio.clone(),
            state: RwLock::new(ManifestState {
                video_sequence: 1,
                audio_sequence: 1,
                ..Default::default()
            }),
        }
    }

    /// Records the latest seen timestamp for a track, feeding the
    /// inter-track drift diagnostic.
    pub(crate) fn note_sample(&self, kind: TrackKind, pts: i64) {
        let mut state = self.state.write();
        match kind {
            TrackKind::Video => state.last_video_pts = Some(pts),
            TrackKind::Audio => state.last_audio_pts = Some(pts),
        }
    }

    /// Rebuilds the cached manifest after a successful finalize on the
    /// given track; `next_sequence` is the sequence number the next
    /// segment of that track will carry.
    pub(crate) fn update(&self, kind: TrackKind, next_sequence: u32) {
        let mut state = self.state.write();
        match kind {
            TrackKind::Video => state.video_sequence = next_sequence,
            TrackKind::Audio => state.audio_sequence = next_sequence,
        }
        state.started = true;
        let template = self.render(&state);
        state.template = template;
        self.report_drift(&state);
    }

    /// Returns the manifest text with publish timing substituted for
    /// this request. Fails until the first segment has been published.
    pub fn manifest(&self) -> Result<String> {
        let state = self.state.read();
        if !state.started {
            debug!("manifest requested before the stream began");
            return Err(CmafError::NotStarted);
        }

        Ok(state
            .template
            .replace(PUBLISH_TIME_MARKER, &utc_second())
            .replace(UTC_TIMING_MARKER, &utc_millisecond()))
    }

    fn render(&self, state: &ManifestState) -> String {
        let duration = self.segment_duration;
        let mut text = String::with_capacity(2048);

        text.push_str(&format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <MPD xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n\
             \txmlns=\"urn:mpeg:dash:schema:mpd:2011\"\n\
             \txmlns:xlink=\"http://www.w3.org/1999/xlink\"\n\
             \txsi:schemaLocation=\"urn:mpeg:DASH:schema:MPD:2011 http://standards.iso.org/ittf/PubliclyAvailableStandards/MPEG-DASH_schema_files/DASH-MPD.xsd\"\n\
             \tprofiles=\"urn:mpeg:dash:profile:isoff-live:2011\"\n\
             \ttype=\"dynamic\"\n\
             \tminimumUpdatePeriod=\"PT{MINIMUM_UPDATE_PERIOD_SECS:.3}S\"\n\
             \tpublishTime=\"{PUBLISH_TIME_MARKER}\"\n\
             \tavailabilityStartTime=\"{start}\"\n\
             \ttimeShiftBufferDepth=\"PT{TIME_SHIFT_BUFFER_DEPTH_SECS:.3}S\"\n\
             \tsuggestedPresentationDelay=\"PT{duration:.3}S\"\n\
             \tminBufferTime=\"PT{duration:.3}S\">\n\
             \t<Period id=\"0\" start=\"PT0S\">\n",
            start = self.availability_start_time,
        ));

        if state.video_sequence > 1 {
            if let Some(params) = &self.video {
                let offset = if params.frame_rate != 0.0 {
                    duration - 1.0 / params.frame_rate
                } else {
                    duration
                };

                text.push_str(&format!(
                    "\t\t<AdaptationSet id=\"0\" group=\"1\" mimeType=\"video/mp4\" \
                     width=\"{width}\" height=\"{height}\" par=\"{par}\" frameRate=\"{rate:.3}\" \
                     segmentAlignment=\"true\" startWithSAP=\"1\" subsegmentAlignment=\"true\" subsegmentStartsWithSAP=\"1\">\n",
                    width = params.width,
                    height = params.height,
                    par = params.pixel_aspect,
                    rate = params.frame_rate,
                ));
                text.push_str(&format!(
                    "\t\t\t<SegmentTemplate presentationTimeOffset=\"0\" timescale=\"{timescale}\" \
                     duration=\"{ticks}\" availabilityTimeOffset=\"{offset:.3}\" startNumber=\"1\" \
                     initialization=\"{init}\" media=\"{prefix}_$Number${suffix}\" />\n",
                    timescale = params.timescale,
                    ticks = (duration * f64::from(params.timescale)) as u32,
                    init = VIDEO_INIT_FILE_NAME,
                    prefix = self.segment_prefix,
                    suffix = VIDEO_MEDIA_SUFFIX,
                ));
                text.push_str(&format!(
                    "\t\t\t<Representation codecs=\"{VIDEO_CODECS}\" sar=\"1:1\" bandwidth=\"{bandwidth}\" />\n\
                     \t\t</AdaptationSet>\n",
                    bandwidth = params.bitrate,
                ));
            }
        }

        if state.audio_sequence > 1 {
            if let Some(params) = &self.audio {
                let offset = if params.sample_rate != 0 {
                    duration - 1024.0 / f64::from(params.sample_rate)
                } else {
                    duration
                };

                text.push_str(&format!(
                    "\t\t<AdaptationSet id=\"1\" group=\"2\" mimeType=\"audio/mp4\" lang=\"und\" \
                     segmentAlignment=\"true\" startWithSAP=\"1\" subsegmentAlignment=\"true\" subsegmentStartsWithSAP=\"1\">\n\
                     \t\t\t<AudioChannelConfiguration schemeIdUri=\"urn:mpeg:dash:23003:3:audio_channel_configuration:2011\" value=\"{channels}\"/>\n",
                    channels = params.channels,
                ));
                text.push_str(&format!(
                    "\t\t\t<SegmentTemplate presentationTimeOffset=\"0\" timescale=\"{timescale}\" \
                     duration=\"{ticks}\" availabilityTimeOffset=\"{offset:.3}\" startNumber=\"1\" \
                     initialization=\"{init}\" media=\"{prefix}_$Number${suffix}\" />\n",
                    timescale = params.timescale,
                    ticks = (duration * f64::from(params.timescale)) as u32,
                    init = AUDIO_INIT_FILE_NAME,
                    prefix = self.segment_prefix,
                    suffix = AUDIO_MEDIA_SUFFIX,
                ));
                text.push_str(&format!(
                    "\t\t\t<Representation codecs=\"{AUDIO_CODECS}\" audioSamplingRate=\"{rate}\" bandwidth=\"{bandwidth}\" />\n\
                     \t\t</AdaptationSet>\n",
                    rate = params.sample_rate,
                    bandwidth = params.bitrate,
                ));
            }
        }

        text.push_str(&format!(
            "\t</Period>\n\
             \t<UTCTiming schemeIdUri=\"urn:mpeg:dash:utc:direct:2014\" value=\"{UTC_TIMING_MARKER}\"/>\n\
             </MPD>\n"
        ));

        text
    }

    // diagnostic only: how far apart the two tracks' last-seen
    // timestamps are, in wall-clock milliseconds
    fn report_drift(&self, state: &ManifestState) {
        let (Some(video_params), Some(audio_params)) = (self.video.as_ref(), self.audio.as_ref())
        else {
            return;
        };
        let (Some(video_pts), Some(audio_pts)) = (state.last_video_pts, state.last_audio_pts)
        else {
            return;
        };

        let video_ms = pts_to_millis(video_pts, video_params.timescale);
        let audio_ms = pts_to_millis(audio_pts, audio_params.timescale);
        debug!(
            "time difference a-v: {} ms (audio: {} ms, video: {} ms)",
            audio_ms - video_ms,
            audio_ms,
            video_ms
        );
    }
}

fn pts_to_millis(pts: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (pts as f64 * 1000.0 / f64::from(timescale)) as i64
}

fn utc_second() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn utc_millisecond() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
