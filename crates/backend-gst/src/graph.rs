//! Audio mixing as an `audiomixer` launch fragment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use recast_common::{RecastError, RecastResult};
use recast_engine::{AudioGraph, AudioGraphFactory, GraphSettings, MediaTrack, TrackKind};

use crate::track::GstTrack;

static NEXT_MIXER: AtomicU64 = AtomicU64::new(0);

pub struct GstAudioGraphFactory;

impl GstAudioGraphFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GstAudioGraphFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioGraphFactory for GstAudioGraphFactory {
    fn create_graph(&self, settings: &GraphSettings) -> RecastResult<Box<dyn AudioGraph>> {
        Ok(Box::new(GstAudioGraph {
            mixer: format!("amix{}", NEXT_MIXER.fetch_add(1, Ordering::Relaxed)),
            sample_rate: settings.sample_rate,
            branches: Vec::new(),
        }))
    }
}

/// Collects gain-staged source branches; `output_track` folds them into
/// one fragment around a shared `audiomixer`.
struct GstAudioGraph {
    mixer: String,
    sample_rate: u32,
    branches: Vec<(String, f64)>,
}

impl AudioGraph for GstAudioGraph {
    fn connect_source(&mut self, track: &Arc<dyn MediaTrack>, gain: f64) -> RecastResult<()> {
        let gst_track = track
            .as_any()
            .downcast_ref::<GstTrack>()
            .ok_or_else(|| RecastError::mixing("Track does not belong to the GStreamer backend"))?;
        if gst_track.kind() != TrackKind::Audio {
            return Err(RecastError::mixing("Only audio tracks can be mixed"));
        }
        self.branches.push((gst_track.fragment().to_string(), gain));
        Ok(())
    }

    fn output_track(&mut self) -> RecastResult<Arc<dyn MediaTrack>> {
        if self.branches.is_empty() {
            return Err(RecastError::mixing("No sources connected to the mix graph"));
        }
        Ok(Arc::new(GstTrack::new(
            "mixed-audio",
            TrackKind::Audio,
            mix_fragment(&self.mixer, self.sample_rate, &self.branches),
            None,
        )))
    }

    fn close(&mut self) {
        // Nothing is realized until the encoder builds the pipeline;
        // dropping the collected branches is the whole teardown.
        self.branches.clear();
    }
}

/// Fold gain-staged branches into one mixer fragment. The trailing
/// `name.` chain re-opens the mixer's source pad, so the fragment stays
/// appendable like any single-element one.
fn mix_fragment(mixer: &str, sample_rate: u32, branches: &[(String, f64)]) -> String {
    let mut out = format!("audiomixer name={mixer}");
    for (branch, gain) in branches {
        out.push_str(&format!(" {branch} ! volume volume={gain} ! queue ! {mixer}."));
    }
    out.push_str(&format!(
        " {mixer}. ! audioconvert ! audioresample ! audio/x-raw,rate={sample_rate}"
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_fragment_gain_stages_every_branch() {
        let fragment = mix_fragment(
            "amix7",
            44_100,
            &[
                ("pipewiresrc do-timestamp=true".to_string(), 0.8),
                ("pulsesrc do-timestamp=true".to_string(), 0.7),
            ],
        );
        assert!(fragment.starts_with("audiomixer name=amix7"));
        assert!(fragment.contains("pipewiresrc do-timestamp=true ! volume volume=0.8 ! queue ! amix7."));
        assert!(fragment.contains("pulsesrc do-timestamp=true ! volume volume=0.7 ! queue ! amix7."));
        assert!(fragment.ends_with("amix7. ! audioconvert ! audioresample ! audio/x-raw,rate=44100"));
    }

    #[test]
    fn graphs_use_distinct_mixer_names() {
        let factory = GstAudioGraphFactory::new();
        let settings = GraphSettings {
            sample_rate: 48_000,
            latency: recast_engine::LatencyHint::Playback,
        };
        let track: Arc<dyn MediaTrack> = Arc::new(GstTrack::new(
            "audio",
            TrackKind::Audio,
            "pulsesrc".into(),
            None,
        ));

        let mut names = Vec::new();
        for _ in 0..2 {
            let mut graph = factory.create_graph(&settings).unwrap();
            graph.connect_source(&track, 1.0).unwrap();
            let out = graph.output_track().unwrap();
            let fragment = out
                .as_any()
                .downcast_ref::<GstTrack>()
                .unwrap()
                .fragment()
                .to_string();
            names.push(fragment);
        }
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn foreign_tracks_are_rejected() {
        struct Foreign;
        #[async_trait::async_trait]
        impl MediaTrack for Foreign {
            fn id(&self) -> &str {
                "foreign"
            }
            fn kind(&self) -> TrackKind {
                TrackKind::Audio
            }
            fn stop(&self) {}
            fn is_ended(&self) -> bool {
                false
            }
            async fn wait_ended(&self) {}
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let factory = GstAudioGraphFactory::new();
        let settings = GraphSettings {
            sample_rate: 48_000,
            latency: recast_engine::LatencyHint::Playback,
        };
        let mut graph = factory.create_graph(&settings).unwrap();
        let foreign: Arc<dyn MediaTrack> = Arc::new(Foreign);
        assert!(graph.connect_source(&foreign, 1.0).is_err());
    }
}
