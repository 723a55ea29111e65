//! Streaming encoder over a composed GStreamer pipeline.
//!
//! All tracks are realized into one `parse::launch` pipeline that muxes
//! into a spool file. A tail task reads newly appended bytes on every
//! chunk interval; stopping sends EOS and drains the bus so the muxer
//! can finalize before the final chunk is read.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gst::prelude::*;
use gstreamer as gst;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};

use recast_common::{RecastError, RecastResult};
use recast_engine::{
    BitratePlan, CodecChoice, Container, EncoderEvent, EncoderFactory, MediaTrack, StreamEncoder,
    TrackKind, VideoSettings,
};

use crate::track::GstTrack;
use crate::{escape_path, init_gstreamer};

static NEXT_SPOOL: AtomicU64 = AtomicU64::new(0);

pub struct GstEncoderFactory {
    spool_dir: PathBuf,
}

impl GstEncoderFactory {
    pub fn new() -> Self {
        Self {
            spool_dir: std::env::temp_dir(),
        }
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }
}

impl Default for GstEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for GstEncoderFactory {
    fn is_supported(&self, codec: &CodecChoice) -> bool {
        let video_ok = match (codec.container, codec.video_codec) {
            (Container::Mp4, None) => true,
            (Container::Mp4, Some(v)) => v.starts_with("avc1") || v == "h264",
            (Container::WebM, None) => true,
            (Container::WebM, Some(v)) => v == "vp8" || v == "vp9",
        };
        let audio_ok = match (codec.container, codec.audio_codec) {
            (_, None) => true,
            (Container::Mp4, Some(a)) => a.starts_with("mp4a") || a == "aac",
            (Container::WebM, Some(a)) => a == "opus",
        };
        video_ok && audio_ok
    }

    fn create(
        &self,
        tracks: &[Arc<dyn MediaTrack>],
        codec: &CodecChoice,
        bitrates: &BitratePlan,
    ) -> RecastResult<Arc<dyn StreamEncoder>> {
        let mut video: Option<(&GstTrack, Option<VideoSettings>)> = None;
        let mut audio: Vec<&GstTrack> = Vec::new();
        for track in tracks {
            let gst_track = track.as_any().downcast_ref::<GstTrack>().ok_or_else(|| {
                RecastError::encoding("Track does not belong to the GStreamer backend")
            })?;
            match gst_track.kind() {
                TrackKind::Video => video = Some((gst_track, gst_track.video_settings())),
                TrackKind::Audio => audio.push(gst_track),
            }
        }
        let (video, settings) =
            video.ok_or_else(|| RecastError::encoding("Encoder needs a video track"))?;

        let extension = match codec.container {
            Container::Mp4 => "mp4",
            Container::WebM => "webm",
        };
        let spool = self.spool_dir.join(format!(
            "recast-spool-{}-{}.{extension}",
            std::process::id(),
            NEXT_SPOOL.fetch_add(1, Ordering::Relaxed),
        ));

        let audio_fragments: Vec<&str> = audio.iter().map(|t| t.fragment()).collect();
        let launch = build_launch(
            video.fragment(),
            settings,
            &audio_fragments,
            codec,
            bitrates,
            &spool,
        );
        tracing::debug!(%launch, "Encoder pipeline prepared");

        let (stopping, _) = watch::channel(false);
        Ok(Arc::new(SpoolEncoder {
            launch,
            spool,
            pipeline: Mutex::new(None),
            stopping,
            started: AtomicBool::new(false),
        }))
    }
}

/// Compose the full launch string: muxer and sink first, then the video
/// branch, then one branch per audio track.
fn build_launch(
    video_fragment: &str,
    settings: Option<VideoSettings>,
    audio_fragments: &[&str],
    codec: &CodecChoice,
    bitrates: &BitratePlan,
    spool: &Path,
) -> String {
    let path = escape_path(spool);
    // fragment-duration keeps the mp4 streamable, so tailing the spool
    // mid-recording reads complete fragments rather than a broken moov.
    let mux = match codec.container {
        Container::Mp4 => "mp4mux name=mux fragment-duration=1000",
        Container::WebM => "webmmux name=mux",
    };

    let fps = settings.map(|s| s.frame_rate).unwrap_or(30.0).round().max(1.0) as u32;
    let keyint = fps.saturating_mul(2).max(2);
    let video_encoder = match (codec.container, codec.video_codec) {
        (Container::Mp4, _) => {
            let kbps = (bitrates.video_bps / 1000).max(1);
            format!(
                "x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} \
                 key-int-max={keyint} ! h264parse"
            )
        }
        (Container::WebM, Some("vp9")) => {
            format!("vp9enc deadline=1 target-bitrate={}", bitrates.video_bps)
        }
        (Container::WebM, _) => {
            format!("vp8enc deadline=1 target-bitrate={}", bitrates.video_bps)
        }
    };
    let audio_encoder = match codec.container {
        Container::Mp4 => format!("avenc_aac bitrate={} ! aacparse", bitrates.audio_bps),
        Container::WebM => format!("opusenc bitrate={}", bitrates.audio_bps),
    };

    let mut launch = format!("{mux} ! filesink location=\"{path}\"");
    launch.push_str(&format!(
        " {video_fragment} ! queue max-size-buffers=8 ! {video_encoder} ! \
         queue max-size-buffers=8 ! mux."
    ));
    for fragment in audio_fragments {
        launch.push_str(&format!(
            " {fragment} ! queue ! audioconvert ! audioresample ! {audio_encoder} ! queue ! mux."
        ));
    }
    launch
}

struct SpoolEncoder {
    launch: String,
    spool: PathBuf,
    pipeline: Mutex<Option<gst::Pipeline>>,
    stopping: watch::Sender<bool>,
    started: AtomicBool,
}

#[async_trait]
impl StreamEncoder for SpoolEncoder {
    async fn start(&self, chunk_interval: Duration) -> RecastResult<mpsc::Receiver<EncoderEvent>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RecastError::encoding("Encoder can only be started once"));
        }

        let launch = self.launch.clone();
        let pipeline = tokio::task::spawn_blocking(move || build_and_play(&launch))
            .await
            .map_err(|e| RecastError::encoding(format!("Encoder startup task failed: {e}")))??;

        let bus = pipeline.bus();
        *self.pipeline.lock() = Some(pipeline);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(tail_spool(
            bus,
            self.spool.clone(),
            chunk_interval,
            self.stopping.subscribe(),
            tx,
        ));
        Ok(rx)
    }

    async fn stop(&self) -> RecastResult<()> {
        let pipeline = self.pipeline.lock().take();
        if let Some(pipeline) = pipeline {
            let drained = tokio::task::spawn_blocking(move || drain_and_stop(pipeline))
                .await
                .map_err(|e| RecastError::encoding(format!("Encoder stop task failed: {e}")))?;
            // The tail task must still get its final read and Finished
            // event, so a drain error is reported after signalling it.
            self.stopping.send_replace(true);
            drained?;
        } else {
            self.stopping.send_replace(true);
        }
        Ok(())
    }
}

/// Build the pipeline and wait for it to actually reach Playing. State
/// changes are async in GStreamer; returning earlier would race the
/// capture sources opening.
fn build_and_play(launch: &str) -> RecastResult<gst::Pipeline> {
    init_gstreamer()?;

    let element = gst::parse::launch(launch)
        .map_err(|e| RecastError::encoding(format!("Failed to build encoder pipeline: {e}")))?;
    let pipeline = element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| RecastError::encoding("Launch string did not produce a pipeline"))?;

    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| RecastError::encoding(format!("Failed to start encoder pipeline: {e:?}")))?;

    match pipeline.state(gst::ClockTime::from_seconds(10)) {
        (Ok(_), gst::State::Playing, _) => {}
        (Ok(_), state, _) => {
            tracing::warn!(?state, "Encoder pipeline did not reach Playing within timeout");
        }
        (Err(e), _, _) => {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(RecastError::encoding(format!(
                "Encoder pipeline failed to reach Playing: {e:?}"
            )));
        }
    }
    Ok(pipeline)
}

/// Send EOS and drain the bus before tearing down. Without the drain the
/// muxer never finalizes and the recording tail is truncated.
fn drain_and_stop(pipeline: gst::Pipeline) -> RecastResult<()> {
    let eos_sent = pipeline.send_event(gst::event::Eos::new());
    if !eos_sent {
        tracing::warn!("Failed to send EOS; output may be truncated");
    } else if let Some(bus) = pipeline.bus() {
        let deadline = Duration::from_secs(10);
        let start = std::time::Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                tracing::warn!("EOS drain timed out after 10s");
                break;
            }
            let remaining = deadline - elapsed;
            let timeout = gst::ClockTime::from_nseconds(remaining.as_nanos() as u64);
            match bus.timed_pop(timeout) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!("EOS received; encoder pipeline drained");
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        tracing::warn!(error = %e.error(), "Pipeline error during EOS drain");
                        break;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!("EOS drain timed out after 10s");
                    break;
                }
            }
        }
    }

    pipeline
        .set_state(gst::State::Null)
        .map_err(|e| RecastError::encoding(format!("Failed to stop encoder pipeline: {e:?}")))?;
    Ok(())
}

/// Emit newly appended spool bytes every interval; a stop signal
/// triggers the final read, `Finished`, and spool cleanup.
async fn tail_spool(
    bus: Option<gst::Bus>,
    spool: PathBuf,
    chunk_interval: Duration,
    mut stopping: watch::Receiver<bool>,
    tx: mpsc::Sender<EncoderEvent>,
) {
    let mut file: Option<tokio::fs::File> = None;
    let mut ticker = tokio::time::interval(chunk_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(bus) = &bus {
                    if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
                        if let gst::MessageView::Error(e) = msg.view() {
                            tracing::error!(error = %e.error(), "Encoder pipeline error");
                            let _ = tx.send(EncoderEvent::Error(e.error().to_string())).await;
                            return;
                        }
                    }
                }
                if !emit_new_bytes(&mut file, &spool, &tx).await {
                    return;
                }
            }
            _ = stopping.changed() => {
                let _ = emit_new_bytes(&mut file, &spool, &tx).await;
                let _ = tx.send(EncoderEvent::Finished).await;
                if let Err(err) = tokio::fs::remove_file(&spool).await {
                    tracing::debug!(error = %err, spool = %spool.display(), "Spool cleanup failed");
                }
                return;
            }
        }
    }
}

/// Read whatever the pipeline appended since the last call. Returns
/// false once the receiver is gone.
async fn emit_new_bytes(
    file: &mut Option<tokio::fs::File>,
    spool: &Path,
    tx: &mpsc::Sender<EncoderEvent>,
) -> bool {
    if file.is_none() {
        // The sink may not have created the file yet on early ticks.
        *file = tokio::fs::File::open(spool).await.ok();
    }
    let Some(f) = file.as_mut() else {
        return true;
    };
    let mut buf = Vec::new();
    match f.read_to_end(&mut buf).await {
        Ok(_) if !buf.is_empty() => tx.send(EncoderEvent::Chunk(buf)).await.is_ok(),
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "Spool read failed");
            true
        }
    }
}
