//! Microphone capture via PulseAudio/PipeWire.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

use recast_common::{RecastError, RecastResult};
use recast_engine::{
    AudioInputDevice, MediaTrack, MicrophoneConstraints, MicrophoneSource, TrackKind,
};

use crate::track::GstTrack;

/// One `pactl list short sources` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PactlSource {
    pub name: String,
    pub monitor: bool,
}

/// Parse `pactl list short sources` output. Columns are tab separated:
/// index, name, driver, sample spec, state. Monitor sources carry the
/// `.monitor` suffix.
pub(crate) fn parse_pactl_sources(output: &str) -> Vec<PactlSource> {
    output
        .lines()
        .filter_map(|line| {
            let name = line.split('\t').nth(1)?;
            Some(PactlSource {
                name: name.to_string(),
                monitor: name.ends_with(".monitor"),
            })
        })
        .collect()
}

pub(crate) async fn list_pactl_sources() -> RecastResult<Vec<PactlSource>> {
    let output = Command::new("pactl")
        .args(["list", "short", "sources"])
        .output()
        .await
        .map_err(|e| RecastError::no_source(format!("Failed to run pactl: {e}")))?;
    if !output.status.success() {
        return Err(RecastError::no_source(
            "pactl could not list audio sources; is the audio server running?",
        ));
    }
    Ok(parse_pactl_sources(&String::from_utf8_lossy(&output.stdout)))
}

pub struct GstMicrophoneSource;

impl GstMicrophoneSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GstMicrophoneSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Launch fragment for a microphone source.
fn microphone_fragment(device: Option<&str>, sample_rate: u32, channels: u32) -> String {
    let device = match device {
        Some(d) => format!(" device={d}"),
        None => String::new(),
    };
    format!(
        "pulsesrc do-timestamp=true{device} ! audioconvert ! audioresample ! \
         audio/x-raw,rate={sample_rate},channels={channels}"
    )
}

#[async_trait]
impl MicrophoneSource for GstMicrophoneSource {
    async fn request_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> RecastResult<Arc<dyn MediaTrack>> {
        let sources = list_pactl_sources().await?;
        let inputs: Vec<_> = sources.iter().filter(|s| !s.monitor).collect();
        if inputs.is_empty() {
            return Err(RecastError::no_source("No audio input devices attached"));
        }

        if let Some(device) = constraints.device_id.as_deref() {
            if !inputs.iter().any(|s| s.name == device) {
                return Err(RecastError::no_source(format!(
                    "Requested microphone {device} is not attached"
                )));
            }
        }

        let fragment = microphone_fragment(
            constraints.device_id.as_deref(),
            constraints.audio.sample_rate,
            constraints.audio.channel_count,
        );
        tracing::debug!(%fragment, "Microphone source prepared");
        Ok(Arc::new(GstTrack::new(
            "microphone",
            TrackKind::Audio,
            fragment,
            None,
        )))
    }

    async fn enumerate_devices(&self) -> RecastResult<Vec<AudioInputDevice>> {
        let sources = list_pactl_sources().await?;
        Ok(sources
            .into_iter()
            .filter(|s| !s.monitor)
            .map(|s| AudioInputDevice {
                label: s.name.clone(),
                id: s.name,
            })
            .collect())
    }
}
