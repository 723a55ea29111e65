//! Platform policy: codec preference, bitrate tiers, capture constraints.
//!
//! Pure, deterministic functions of a coarse platform classification and
//! the negotiated resolution. Everything platform-conditional lives in
//! the data tables here rather than in scattered branches, which keeps
//! the policy trivially unit-testable.

use serde::{Deserialize, Serialize};

/// Coarse platform bucket used to select gain, bitrate, and constraint
/// tables.
///
/// `Constrained` covers hosts whose capture/encode stack has shown
/// higher overhead and corruption risk at aggressive settings; in
/// practice that is Windows. Everything else takes the default tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformClass {
    Default,
    Constrained,
}

impl PlatformClass {
    /// Classify the host this process is running on.
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Constrained
        } else {
            Self::Default
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Mp4,
    WebM,
}

impl Container {
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::WebM => "video/webm",
        }
    }
}

/// One container/codec candidate, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecChoice {
    pub container: Container,
    pub video_codec: Option<&'static str>,
    pub audio_codec: Option<&'static str>,
}

impl CodecChoice {
    const fn new(
        container: Container,
        video_codec: Option<&'static str>,
        audio_codec: Option<&'static str>,
    ) -> Self {
        Self {
            container,
            video_codec,
            audio_codec,
        }
    }

    /// Full mime identifier, e.g. `video/mp4;codecs=avc1.42E01E,mp4a.40.2`.
    pub fn mime_type(&self) -> String {
        match (self.video_codec, self.audio_codec) {
            (Some(v), Some(a)) => format!("{};codecs={},{}", self.container.mime_prefix(), v, a),
            (Some(v), None) => format!("{};codecs={}", self.container.mime_prefix(), v),
            _ => self.container.mime_prefix().to_string(),
        }
    }
}

/// Codec preference on constrained hosts: baseline H.264 first (most
/// compatible), VP8 ahead of VP9 (more stable there).
const CONSTRAINED_CODECS: &[CodecChoice] = &[
    CodecChoice::new(Container::Mp4, Some("avc1.42E01E"), Some("mp4a.40.2")),
    CodecChoice::new(Container::Mp4, Some("avc1.640028"), Some("mp4a.40.2")),
    CodecChoice::new(Container::Mp4, None, None),
    CodecChoice::new(Container::WebM, Some("vp8"), Some("opus")),
    CodecChoice::new(Container::WebM, None, None),
];

/// Codec preference elsewhere: high-profile H.264 first, then VP9.
const DEFAULT_CODECS: &[CodecChoice] = &[
    CodecChoice::new(Container::Mp4, Some("avc1.64002A"), Some("mp4a.40.2")),
    CodecChoice::new(Container::Mp4, Some("avc1.640028"), Some("mp4a.40.2")),
    CodecChoice::new(Container::Mp4, Some("avc1.42E01E"), Some("mp4a.40.2")),
    CodecChoice::new(Container::Mp4, Some("h264"), Some("aac")),
    CodecChoice::new(Container::Mp4, None, None),
    CodecChoice::new(Container::WebM, Some("vp9"), Some("opus")),
    CodecChoice::new(Container::WebM, Some("vp8"), Some("opus")),
    CodecChoice::new(Container::WebM, None, None),
];

/// Universally-assumed-safe choice when no candidate is supported.
pub const FALLBACK_CODEC: CodecChoice = CodecChoice::new(Container::WebM, None, None);

/// Ordered codec candidates for a platform class.
pub fn codec_candidates(class: PlatformClass) -> &'static [CodecChoice] {
    match class {
        PlatformClass::Constrained => CONSTRAINED_CODECS,
        PlatformClass::Default => DEFAULT_CODECS,
    }
}

/// Pick the first candidate the encoder backend reports as supported,
/// falling back to [`FALLBACK_CODEC`].
pub fn negotiate_codec(
    class: PlatformClass,
    mut is_supported: impl FnMut(&CodecChoice) -> bool,
) -> CodecChoice {
    codec_candidates(class)
        .iter()
        .copied()
        .find(|c| is_supported(c))
        .unwrap_or(FALLBACK_CODEC)
}

/// Target bitrates for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitratePlan {
    pub video_bps: u64,
    pub audio_bps: u64,
}

/// Video bitrate tiers: (minimum pixel count, default bps, constrained bps).
/// Constrained values are deliberately lower at every tier to reduce
/// encoder failure and output corruption on that class.
const VIDEO_BITRATE_TIERS: &[(u64, u64, u64)] = &[
    (3840 * 2160, 25_000_000, 15_000_000),
    (2560 * 1440, 16_000_000, 10_000_000),
    (1920 * 1080, 8_000_000, 6_000_000),
    (0, 5_000_000, 3_000_000),
];

const AUDIO_BPS_DEFAULT: u64 = 320_000;
const AUDIO_BPS_CONSTRAINED: u64 = 256_000;

/// Bitrate plan as a step function of pixel count.
pub fn bitrate_plan(width: u32, height: u32, class: PlatformClass) -> BitratePlan {
    let pixels = width as u64 * height as u64;
    let tier = VIDEO_BITRATE_TIERS
        .iter()
        .find(|(min_pixels, _, _)| pixels >= *min_pixels)
        .expect("tier table covers zero pixels");

    let video_bps = match class {
        PlatformClass::Default => tier.1,
        PlatformClass::Constrained => tier.2,
    };
    let audio_bps = match class {
        PlatformClass::Default => AUDIO_BPS_DEFAULT,
        PlatformClass::Constrained => AUDIO_BPS_CONSTRAINED,
    };

    BitratePlan {
        video_bps,
        audio_bps,
    }
}

/// An ideal/max range for a capture dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub ideal: u32,
    pub max: u32,
}

/// Processing flags and format for an audio track request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub sample_size: u32,
}

/// Constraints for a display capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConstraints {
    pub width: Range,
    pub height: Range,
    pub frame_rate: Range,
    /// Present when system audio is wanted; the source may still refuse.
    pub audio: Option<AudioTrackConstraints>,
}

/// Constraints for a microphone capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrophoneConstraints {
    /// Exact device to open, or the platform default when `None`.
    pub device_id: Option<String>,
    pub audio: AudioTrackConstraints,
}

fn class_sample_rate(class: PlatformClass) -> u32 {
    match class {
        PlatformClass::Default => 48_000,
        PlatformClass::Constrained => 44_100,
    }
}

fn class_channel_count(class: PlatformClass) -> u32 {
    match class {
        PlatformClass::Default => 2,
        PlatformClass::Constrained => 1,
    }
}

/// Display capture defaults. The constrained class asks for lower
/// resolution and frame-rate ceilings, mono audio, and a lower sample
/// rate. System audio is requested raw: no echo cancellation, noise
/// suppression, or AGC.
pub fn capture_constraints(class: PlatformClass, want_system_audio: bool) -> DisplayConstraints {
    let (width, height, frame_rate) = match class {
        PlatformClass::Constrained => (
            Range {
                ideal: 1920,
                max: 2560,
            },
            Range {
                ideal: 1080,
                max: 1440,
            },
            Range { ideal: 30, max: 30 },
        ),
        PlatformClass::Default => (
            Range {
                ideal: 2560,
                max: 3840,
            },
            Range {
                ideal: 1440,
                max: 2160,
            },
            Range { ideal: 60, max: 60 },
        ),
    };

    let audio = want_system_audio.then_some(AudioTrackConstraints {
        echo_cancellation: false,
        noise_suppression: false,
        auto_gain_control: false,
        sample_rate: class_sample_rate(class),
        channel_count: class_channel_count(class),
        sample_size: 16,
    });

    DisplayConstraints {
        width,
        height,
        frame_rate,
        audio,
    }
}

/// Microphone defaults: voice processing on, format per platform class.
pub fn microphone_constraints(
    class: PlatformClass,
    device_id: Option<&str>,
) -> MicrophoneConstraints {
    MicrophoneConstraints {
        device_id: device_id.map(str::to_string),
        audio: AudioTrackConstraints {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: class_sample_rate(class),
            channel_count: class_channel_count(class),
            sample_size: 16,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_tiers_match_table() {
        let p = |w, h, c| bitrate_plan(w, h, c);

        assert_eq!(p(3840, 2160, PlatformClass::Default).video_bps, 25_000_000);
        assert_eq!(p(2560, 1440, PlatformClass::Default).video_bps, 16_000_000);
        assert_eq!(p(1920, 1080, PlatformClass::Default).video_bps, 8_000_000);
        assert_eq!(p(1280, 720, PlatformClass::Default).video_bps, 5_000_000);

        assert_eq!(
            p(3840, 2160, PlatformClass::Constrained).video_bps,
            15_000_000
        );
        assert_eq!(
            p(2560, 1440, PlatformClass::Constrained).video_bps,
            10_000_000
        );
        assert_eq!(
            p(1920, 1080, PlatformClass::Constrained).video_bps,
            6_000_000
        );
        assert_eq!(p(640, 480, PlatformClass::Constrained).video_bps, 3_000_000);
    }

    #[test]
    fn audio_bitrate_is_constant_per_class() {
        assert_eq!(bitrate_plan(1, 1, PlatformClass::Default).audio_bps, 320_000);
        assert_eq!(
            bitrate_plan(7680, 4320, PlatformClass::Default).audio_bps,
            320_000
        );
        assert_eq!(
            bitrate_plan(1920, 1080, PlatformClass::Constrained).audio_bps,
            256_000
        );
    }

    #[test]
    fn constrained_prefers_baseline_h264() {
        let first = codec_candidates(PlatformClass::Constrained)[0];
        assert_eq!(first.container, Container::Mp4);
        assert_eq!(first.video_codec, Some("avc1.42E01E"));
        assert_eq!(
            first.mime_type(),
            "video/mp4;codecs=avc1.42E01E,mp4a.40.2".to_string()
        );
    }

    #[test]
    fn default_prefers_high_profile_then_vp9_over_vp8() {
        let candidates = codec_candidates(PlatformClass::Default);
        assert_eq!(candidates[0].video_codec, Some("avc1.64002A"));
        let vp9 = candidates
            .iter()
            .position(|c| c.video_codec == Some("vp9"))
            .unwrap();
        let vp8 = candidates
            .iter()
            .position(|c| c.video_codec == Some("vp8"))
            .unwrap();
        assert!(vp9 < vp8);
    }

    #[test]
    fn negotiation_picks_first_supported() {
        let codec = negotiate_codec(PlatformClass::Default, |c| c.container == Container::WebM);
        assert_eq!(codec.container, Container::WebM);
        assert_eq!(codec.video_codec, Some("vp9"));
    }

    #[test]
    fn negotiation_falls_back_to_plain_webm() {
        let codec = negotiate_codec(PlatformClass::Constrained, |_| false);
        assert_eq!(codec, FALLBACK_CODEC);
        assert_eq!(codec.mime_type(), "video/webm");
    }

    #[test]
    fn constrained_constraints_are_mono_low_rate() {
        let c = capture_constraints(PlatformClass::Constrained, true);
        assert_eq!(c.width.ideal, 1920);
        assert_eq!(c.height.max, 1440);
        assert_eq!(c.frame_rate.max, 30);
        let audio = c.audio.unwrap();
        assert_eq!(audio.sample_rate, 44_100);
        assert_eq!(audio.channel_count, 1);
        assert!(!audio.echo_cancellation);
    }

    #[test]
    fn default_constraints_are_stereo_high_rate() {
        let c = capture_constraints(PlatformClass::Default, false);
        assert_eq!(c.width.max, 3840);
        assert_eq!(c.frame_rate.ideal, 60);
        assert!(c.audio.is_none());

        let m = microphone_constraints(PlatformClass::Default, Some("usb-mic"));
        assert_eq!(m.device_id.as_deref(), Some("usb-mic"));
        assert_eq!(m.audio.sample_rate, 48_000);
        assert_eq!(m.audio.channel_count, 2);
        assert!(m.audio.echo_cancellation);
    }
}
