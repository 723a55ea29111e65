//! Display capture via ximagesrc, with system audio from the PipeWire
//! monitor source.
//!
//! Wayland sessions are refused: screen capture there goes through the
//! desktop portal, which is not wired up yet.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

use recast_common::{RecastError, RecastResult};
use recast_engine::{
    DisplayCapture, DisplayConstraints, DisplaySource, MediaTrack, TrackKind, VideoSettings,
};

use crate::microphone::list_pactl_sources;
use crate::track::GstTrack;

/// What kind of display server this process can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DisplayServer {
    X11 { display: String },
    Wayland,
    None,
}

fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok_and(|v| !v.is_empty()) {
        return DisplayServer::Wayland;
    }
    match std::env::var("DISPLAY") {
        Ok(display) if !display.is_empty() => DisplayServer::X11 { display },
        _ => DisplayServer::None,
    }
}

/// Parse the `dimensions:` line of `xdpyinfo` output.
pub(crate) fn parse_xdpyinfo_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().find(|l| l.trim_start().starts_with("dimensions:"))?;
    let dims = line.split_whitespace().nth(1)?;
    let (w, h) = dims.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

async fn probe_screen_size() -> Option<(u32, u32)> {
    let output = Command::new("xdpyinfo").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    parse_xdpyinfo_dimensions(&String::from_utf8_lossy(&output.stdout))
}

/// Launch fragment for the screen source.
fn screen_fragment(frame_rate: u32) -> String {
    // use-damage=false forces full frames; the leaky queue decouples the
    // source from encoder stalls.
    format!(
        "ximagesrc use-damage=false remote=true show-pointer=true ! \
         queue max-size-buffers=200 leaky=downstream ! videoconvert ! videorate ! \
         video/x-raw,framerate={frame_rate}/1"
    )
}

/// Launch fragment for the system-audio monitor source.
fn system_audio_fragment(sample_rate: u32) -> String {
    format!(
        "pipewiresrc do-timestamp=true stream-properties=props,media.class=Audio/Source ! \
         audioconvert ! audioresample ! audio/x-raw,rate={sample_rate}"
    )
}

pub struct GstDisplaySource {
    server: DisplayServer,
}

impl GstDisplaySource {
    pub fn new() -> Self {
        Self {
            server: detect_display_server(),
        }
    }
}

impl Default for GstDisplaySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplaySource for GstDisplaySource {
    fn is_available(&self) -> bool {
        self.server != DisplayServer::None
    }

    /// A local X display is trusted; a forwarded one (`host:0`) is not,
    /// since frames would leave the machine.
    fn is_secure_context(&self) -> bool {
        match &self.server {
            DisplayServer::X11 { display } => display.starts_with(':'),
            DisplayServer::Wayland => true,
            DisplayServer::None => false,
        }
    }

    async fn request_display(
        &self,
        constraints: &DisplayConstraints,
    ) -> RecastResult<DisplayCapture> {
        match &self.server {
            DisplayServer::None => Err(RecastError::no_source("No display server detected")),
            DisplayServer::Wayland => Err(RecastError::unsupported(
                "Wayland screen capture requires the desktop portal, which is not supported yet",
            )),
            DisplayServer::X11 { display } => {
                let frame_rate = constraints.frame_rate.ideal.min(constraints.frame_rate.max);
                let (width, height) = match probe_screen_size().await {
                    Some((w, h)) => (w.min(constraints.width.max), h.min(constraints.height.max)),
                    None => {
                        tracing::debug!("xdpyinfo probe failed; assuming constraint ideals");
                        (constraints.width.ideal, constraints.height.ideal)
                    }
                };
                let settings = VideoSettings {
                    width,
                    height,
                    frame_rate: frame_rate as f64,
                };
                let display_name = display;
                tracing::info!(display = %display_name, width, height, frame_rate, "Capturing X11 display");

                let video: Arc<dyn MediaTrack> = Arc::new(GstTrack::new(
                    "display-video",
                    TrackKind::Video,
                    screen_fragment(frame_rate),
                    Some(settings),
                ));

                // The audio server may have no monitor source at all; the
                // session treats a missing track as "source refused audio".
                let audio = match &constraints.audio {
                    None => None,
                    Some(wanted) => match list_pactl_sources().await {
                        Ok(sources) if sources.iter().any(|s| s.monitor) => {
                            Some(Arc::new(GstTrack::new(
                                "display-audio",
                                TrackKind::Audio,
                                system_audio_fragment(wanted.sample_rate),
                                None,
                            )) as Arc<dyn MediaTrack>)
                        }
                        Ok(_) => {
                            tracing::warn!("No monitor source; recording without system audio");
                            None
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Audio server probe failed; recording without system audio");
                            None
                        }
                    },
                };

                Ok(DisplayCapture { video, audio })
            }
        }
    }
}
