//! Audio mix graph: merges up to two audio tracks into one output track.
//!
//! Created once per recording attempt and destroyed with the session.
//! The graph itself lives behind [`AudioGraphFactory`]; this module owns
//! the policy side — which gain each source gets and how the processing
//! context is configured — as per-platform data tables.

use std::sync::Arc;

use recast_common::{RecastError, RecastResult};

use crate::backend::{AudioGraph, AudioGraphFactory, GraphSettings, LatencyHint, MediaTrack};
use crate::policy::PlatformClass;

/// Gain applied to each source when both are present.
///
/// Gains are not symmetric: the constrained class attenuates both
/// contributions to avoid the clipping artifacts observed on that
/// class's audio stack; the default class passes both through at unity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainTable {
    pub system: f64,
    pub microphone: f64,
}

/// Per-class gain staging. Policy data, not derived computation.
pub const fn gain_table(class: PlatformClass) -> GainTable {
    match class {
        PlatformClass::Constrained => GainTable {
            system: 0.8,
            microphone: 0.7,
        },
        PlatformClass::Default => GainTable {
            system: 1.0,
            microphone: 1.0,
        },
    }
}

impl GraphSettings {
    /// Processing context settings per platform class.
    pub const fn for_class(class: PlatformClass) -> Self {
        match class {
            PlatformClass::Constrained => Self {
                sample_rate: 44_100,
                latency: LatencyHint::Balanced,
            },
            PlatformClass::Default => Self {
                sample_rate: 48_000,
                latency: LatencyHint::Playback,
            },
        }
    }
}

/// Result of a mix: the track to record, plus the live graph when one
/// was actually built (a single input bypasses the graph entirely and
/// keeps its content untouched).
pub struct MixedOutput {
    pub track: Arc<dyn MediaTrack>,
    graph: Option<Box<dyn AudioGraph>>,
}

impl MixedOutput {
    /// Whether a real mix happened (two inputs through gain stages).
    pub fn is_mixed(&self) -> bool {
        self.graph.is_some()
    }

    /// Release the underlying graph. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.close();
        }
    }
}

impl Drop for MixedOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// Manual impl: the boxed graph has no Debug of its own.
impl std::fmt::Debug for MixedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedOutput")
            .field("track", &self.track.id())
            .field("mixed", &self.is_mixed())
            .finish()
    }
}

/// The audio mixing front end.
pub struct AudioMixGraph;

impl AudioMixGraph {
    /// Combine the given audio tracks into a single output track.
    ///
    /// - both absent: `NoAudioToMix` (callers treat this as "nothing to
    ///   mix", not a hard failure)
    /// - exactly one present: identity — the input track is returned
    ///   unchanged, no graph is created, no gain is applied
    /// - both present: each input is wired through its own gain stage
    ///   (per [`gain_table`]) into a shared destination
    pub fn mix(
        factory: &dyn AudioGraphFactory,
        class: PlatformClass,
        system: Option<&Arc<dyn MediaTrack>>,
        microphone: Option<&Arc<dyn MediaTrack>>,
    ) -> RecastResult<MixedOutput> {
        match (system, microphone) {
            (None, None) => Err(RecastError::NoAudioToMix),
            (Some(track), None) | (None, Some(track)) => Ok(MixedOutput {
                track: Arc::clone(track),
                graph: None,
            }),
            (Some(system), Some(microphone)) => {
                let gains = gain_table(class);
                let settings = GraphSettings::for_class(class);
                tracing::debug!(
                    ?class,
                    system_gain = gains.system,
                    microphone_gain = gains.microphone,
                    sample_rate = settings.sample_rate,
                    "Building audio mix graph"
                );

                let mut graph = factory.create_graph(&settings)?;
                graph.connect_source(system, gains.system)?;
                graph.connect_source(microphone, gains.microphone)?;
                let track = graph.output_track()?;

                Ok(MixedOutput {
                    track,
                    graph: Some(graph),
                })
            }
        }
    }
}
