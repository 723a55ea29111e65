//! Launch-fragment tracks.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use recast_engine::{MediaTrack, TrackKind, VideoSettings};

static NEXT_TRACK: AtomicU64 = AtomicU64::new(0);

/// A media track backed by a `gst-launch` fragment.
///
/// The fragment's last element exposes the track's output pad, so a
/// consumer may always append `! element` to it. Nothing runs until the
/// encoder realizes the composed pipeline.
pub struct GstTrack {
    id: String,
    kind: TrackKind,
    fragment: String,
    settings: Option<VideoSettings>,
    ended: watch::Sender<bool>,
}

impl GstTrack {
    pub(crate) fn new(
        label: &str,
        kind: TrackKind,
        fragment: String,
        settings: Option<VideoSettings>,
    ) -> Self {
        let n = NEXT_TRACK.fetch_add(1, Ordering::Relaxed);
        let (ended, _) = watch::channel(false);
        Self {
            id: format!("{label}-{n}"),
            kind,
            fragment,
            settings,
            ended,
        }
    }

    /// The launch fragment this track realizes to.
    pub(crate) fn fragment(&self) -> &str {
        &self.fragment
    }
}

#[async_trait]
impl MediaTrack for GstTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.ended.send_replace(true);
    }

    fn is_ended(&self) -> bool {
        *self.ended.borrow()
    }

    async fn wait_ended(&self) {
        let mut rx = self.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    fn video_settings(&self) -> Option<VideoSettings> {
        self.settings
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
