//! GStreamer implementations of the Recast backend seams.
//!
//! Tracks produced here are descriptions of `gst-launch` fragments; the
//! encoder realizes the whole set as a single pipeline built with
//! [`gst::parse::launch`] and tails its spool file to emit chunks. This
//! keeps capture sources, the audio mix, and the encoder in one clock
//! domain, which is what keeps audio and video in sync.

use std::sync::{Arc, OnceLock};

use gstreamer as gst;

use recast_common::{RecastError, RecastResult};
use recast_engine::BackendSet;

mod display;
mod encoder;
mod graph;
mod microphone;
mod track;

pub use display::GstDisplaySource;
pub use encoder::GstEncoderFactory;
pub use graph::GstAudioGraphFactory;
pub use microphone::GstMicrophoneSource;
pub use track::GstTrack;

/// The full GStreamer backend set, ready for a capture session.
pub fn backend_set() -> BackendSet {
    BackendSet {
        display: Arc::new(GstDisplaySource::new()),
        microphone: Arc::new(GstMicrophoneSource::new()),
        audio_graph: Arc::new(GstAudioGraphFactory::new()),
        encoder: Arc::new(GstEncoderFactory::new()),
    }
}

/// Initialize GStreamer exactly once per process.
pub(crate) fn init_gstreamer() -> RecastResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(RecastError::encoding(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

pub(crate) fn escape_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}
