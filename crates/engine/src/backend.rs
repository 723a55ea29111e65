//! Backend trait seams consumed by the capture session.
//!
//! The engine never talks to a device or codec directly. Display and
//! microphone acquisition, the audio processing graph, and the streaming
//! encoder are all reached through the traits here; the GStreamer
//! backend implements them for real hardware and the test suite
//! implements them with scripted mocks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use recast_common::RecastResult;

use crate::policy::{BitratePlan, CodecChoice, DisplayConstraints, MicrophoneConstraints};

/// What a media track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Settings reported by a live video track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl Default for VideoSettings {
    /// Assumed when a track reports nothing usable.
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
        }
    }
}

/// A live capture track owned by the session.
///
/// `stop` must be idempotent: stopping an already-stopped track is a
/// no-op, never an error. `wait_ended` resolves when the track ends for
/// any reason, including an external one (the user revoking sharing).
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Release the underlying device resource. Idempotent.
    fn stop(&self);

    fn is_ended(&self) -> bool;

    /// Resolve once the track has ended.
    async fn wait_ended(&self);

    /// Negotiated settings, for video tracks that can report them.
    fn video_settings(&self) -> Option<VideoSettings> {
        None
    }

    /// Escape hatch for backends that need their concrete track type back.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Result of a successful display capture request.
pub struct DisplayCapture {
    /// The screen video track. Always present on success.
    pub video: Arc<dyn MediaTrack>,

    /// System/tab audio, when the source granted it. May be absent even
    /// when it was requested.
    pub audio: Option<Arc<dyn MediaTrack>>,
}

/// Display-capture source (screen + optional system audio).
#[async_trait]
pub trait DisplaySource: Send + Sync {
    /// Whether display capture exists at all on this host.
    fn is_available(&self) -> bool;

    /// Whether the transport context is trusted enough to capture.
    fn is_secure_context(&self) -> bool;

    /// Request a display capture. May suspend indefinitely on a user
    /// prompt; a dismissed prompt surfaces as `RecastError::Cancelled`.
    async fn request_display(&self, constraints: &DisplayConstraints)
        -> RecastResult<DisplayCapture>;
}

/// An enumerable audio input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInputDevice {
    pub id: String,
    pub label: String,
}

/// Microphone-capture source.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Request a microphone track matching the constraints.
    async fn request_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> RecastResult<Arc<dyn MediaTrack>>;

    /// List the audio input devices currently attached.
    async fn enumerate_devices(&self) -> RecastResult<Vec<AudioInputDevice>>;
}

/// Latency preference for the audio processing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyHint {
    /// Balance latency against stability (constrained platforms).
    Balanced,
    /// Favor glitch-free playback over latency.
    Playback,
}

/// Settings for creating an audio processing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSettings {
    pub sample_rate: u32,
    pub latency: LatencyHint,
}

/// Factory for audio processing graphs. One graph per recording attempt.
pub trait AudioGraphFactory: Send + Sync {
    fn create_graph(&self, settings: &GraphSettings) -> RecastResult<Box<dyn AudioGraph>>;
}

/// A live audio processing graph: gain-staged sources feeding one
/// combined destination.
///
/// `close` must be idempotent; it releases the underlying processing
/// context exactly once.
pub trait AudioGraph: Send {
    /// Route a source track through a gain stage into the destination.
    fn connect_source(&mut self, track: &Arc<dyn MediaTrack>, gain: f64) -> RecastResult<()>;

    /// Produce the combined output track. Contains exactly the sources
    /// connected so far, never fewer, never duplicated.
    fn output_track(&mut self) -> RecastResult<Arc<dyn MediaTrack>>;

    /// Release the graph and its processing context. Idempotent.
    fn close(&mut self);
}

/// One event from a running encoder.
#[derive(Debug)]
pub enum EncoderEvent {
    /// An incrementally emitted unit of encoded data.
    Chunk(Vec<u8>),
    /// A fatal mid-stream encoding error.
    Error(String),
    /// The flush after `stop` has completed; no more events follow.
    Finished,
}

/// Factory for streaming encoders.
pub trait EncoderFactory: Send + Sync {
    /// Whether this backend can encode the given container/codec choice.
    fn is_supported(&self, codec: &CodecChoice) -> bool;

    /// Create an encoder over the given track set.
    fn create(
        &self,
        tracks: &[Arc<dyn MediaTrack>],
        codec: &CodecChoice,
        bitrates: &BitratePlan,
    ) -> RecastResult<Arc<dyn StreamEncoder>>;
}

/// A running streaming encoder.
///
/// The event sequence is lazy, finite, and non-restartable: zero or more
/// `Chunk`s, at most one `Error`, then `Finished` (or channel close).
#[async_trait]
pub trait StreamEncoder: Send + Sync {
    /// Start encoding, emitting a chunk roughly every `chunk_interval`.
    async fn start(&self, chunk_interval: Duration) -> RecastResult<mpsc::Receiver<EncoderEvent>>;

    /// Stop and flush. Idempotent; the second call is a no-op.
    async fn stop(&self) -> RecastResult<()>;
}

/// The four backend seams a session needs, bundled for injection.
#[derive(Clone)]
pub struct BackendSet {
    pub display: Arc<dyn DisplaySource>,
    pub microphone: Arc<dyn MicrophoneSource>,
    pub audio_graph: Arc<dyn AudioGraphFactory>,
    pub encoder: Arc<dyn EncoderFactory>,
}
