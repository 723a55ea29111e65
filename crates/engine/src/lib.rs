//! Recast Capture Engine
//!
//! Orchestrates screen and audio capture into a single encoded artifact.
//! The engine owns the session lifecycle, the audio mixing decisions,
//! and the codec/bitrate negotiation; everything device- and
//! codec-specific sits behind the traits in [`backend`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  CaptureSession                    │
//! │  ┌───────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │ Display   │  │ Microphone   │  │ Platform   │  │
//! │  │ Source    │  │ Source       │  │ Policy     │  │
//! │  └─────┬─────┘  └──────┬───────┘  └─────┬──────┘  │
//! │        │               │                │         │
//! │        ▼               ▼                ▼         │
//! │  ┌──────────────────────────┐   ┌─────────────┐   │
//! │  │       AudioMixGraph      │──▶│   Encoder   │   │
//! │  └──────────────────────────┘   └──────┬──────┘   │
//! │                                        ▼          │
//! │                              chunks ▶ Artifact    │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Acquisition is sequential (microphone first, then display) so the two
//! permission prompts never race for the user's attention. A microphone
//! failure degrades the session; a display failure ends it.

pub mod artifact;
pub mod backend;
pub mod device;
pub mod mixer;
pub mod policy;
pub mod session;

pub use artifact::Artifact;
pub use backend::{
    AudioGraph, AudioGraphFactory, AudioInputDevice, BackendSet, DisplayCapture, DisplaySource,
    EncoderEvent, EncoderFactory, GraphSettings, LatencyHint, MediaTrack, MicrophoneSource,
    StreamEncoder, TrackKind, VideoSettings,
};
pub use mixer::{AudioMixGraph, GainTable, MixedOutput};
pub use policy::{
    BitratePlan, CodecChoice, Container, DisplayConstraints, MicrophoneConstraints, PlatformClass,
};
pub use session::{CaptureSession, Failure, MixPath, SessionOptions, SessionState};
