//! Scripted backend mocks for session and mixer tests.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use recast_common::{RecastError, RecastResult};
use recast_engine::{
    AudioGraph, AudioGraphFactory, AudioInputDevice, BackendSet, BitratePlan, CodecChoice,
    DisplayCapture, DisplayConstraints, DisplaySource, EncoderEvent, EncoderFactory,
    GraphSettings, MediaTrack, MicrophoneConstraints, MicrophoneSource, StreamEncoder, TrackKind,
    VideoSettings,
};

// Tracks

pub struct MockTrack {
    id: String,
    kind: TrackKind,
    settings: Option<VideoSettings>,
    ended: watch::Sender<bool>,
    stop_calls: AtomicUsize,
}

impl MockTrack {
    pub fn video(id: &str) -> Self {
        Self::new(id, TrackKind::Video)
    }

    pub fn audio(id: &str) -> Self {
        Self::new(id, TrackKind::Audio)
    }

    fn new(id: &str, kind: TrackKind) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            kind,
            settings: None,
            ended,
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_settings(mut self, width: u32, height: u32, frame_rate: f64) -> Self {
        self.settings = Some(VideoSettings {
            width,
            height,
            frame_rate,
        });
        self
    }

    /// End the track as if the user revoked sharing.
    pub fn end(&self) {
        self.ended.send_replace(true);
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn was_stopped(&self) -> bool {
        self.stop_calls() > 0
    }
}

#[async_trait]
impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
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

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub fn track_ids(tracks: &[Arc<dyn MediaTrack>]) -> Vec<String> {
    tracks.iter().map(|t| t.id().to_string()).collect()
}

// Display source

pub struct MockDisplaySource {
    available: bool,
    secure: bool,
    grant_audio: bool,
    video_settings: Option<VideoSettings>,
    fail_with: Mutex<Option<RecastError>>,
    pub vended_video: Mutex<Option<Arc<MockTrack>>>,
    pub vended_audio: Mutex<Option<Arc<MockTrack>>>,
    pub seen_constraints: Mutex<Option<DisplayConstraints>>,
}

impl MockDisplaySource {
    pub fn new() -> Self {
        Self {
            available: true,
            secure: true,
            grant_audio: false,
            video_settings: None,
            fail_with: Mutex::new(None),
            vended_video: Mutex::new(None),
            vended_audio: Mutex::new(None),
            seen_constraints: Mutex::new(None),
        }
    }

    pub fn with_audio(mut self) -> Self {
        self.grant_audio = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    pub fn with_video_settings(mut self, width: u32, height: u32, frame_rate: f64) -> Self {
        self.video_settings = Some(VideoSettings {
            width,
            height,
            frame_rate,
        });
        self
    }

    pub fn failing_with(self, err: RecastError) -> Self {
        *self.fail_with.lock() = Some(err);
        self
    }
}

#[async_trait]
impl DisplaySource for MockDisplaySource {
    fn is_available(&self) -> bool {
        self.available
    }

    fn is_secure_context(&self) -> bool {
        self.secure
    }

    async fn request_display(
        &self,
        constraints: &DisplayConstraints,
    ) -> RecastResult<DisplayCapture> {
        *self.seen_constraints.lock() = Some(constraints.clone());
        if let Some(err) = self.fail_with.lock().take() {
            return Err(err);
        }

        let mut video = MockTrack::video("display-video");
        if let Some(s) = self.video_settings {
            video = video.with_settings(s.width, s.height, s.frame_rate);
        }
        let video = Arc::new(video);
        *self.vended_video.lock() = Some(Arc::clone(&video));

        let audio = if self.grant_audio {
            let audio = Arc::new(MockTrack::audio("display-audio"));
            *self.vended_audio.lock() = Some(Arc::clone(&audio));
            Some(audio as Arc<dyn MediaTrack>)
        } else {
            None
        };

        Ok(DisplayCapture {
            video: video as Arc<dyn MediaTrack>,
            audio,
        })
    }
}

// Microphone source

pub struct MockMicrophoneSource {
    fail_with: Mutex<Option<RecastError>>,
    devices: Vec<AudioInputDevice>,
    pub vended: Mutex<Option<Arc<MockTrack>>>,
    pub seen_constraints: Mutex<Option<MicrophoneConstraints>>,
}

impl MockMicrophoneSource {
    pub fn new() -> Self {
        Self {
            fail_with: Mutex::new(None),
            devices: Vec::new(),
            vended: Mutex::new(None),
            seen_constraints: Mutex::new(None),
        }
    }

    pub fn failing_with(self, err: RecastError) -> Self {
        *self.fail_with.lock() = Some(err);
        self
    }

    pub fn with_devices(mut self, devices: Vec<AudioInputDevice>) -> Self {
        self.devices = devices;
        self
    }
}

#[async_trait]
impl MicrophoneSource for MockMicrophoneSource {
    async fn request_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> RecastResult<Arc<dyn MediaTrack>> {
        *self.seen_constraints.lock() = Some(constraints.clone());
        if let Some(err) = self.fail_with.lock().take() {
            return Err(err);
        }
        let track = Arc::new(MockTrack::audio("microphone"));
        *self.vended.lock() = Some(Arc::clone(&track));
        Ok(track as Arc<dyn MediaTrack>)
    }

    async fn enumerate_devices(&self) -> RecastResult<Vec<AudioInputDevice>> {
        Ok(self.devices.clone())
    }
}

// Audio graph

#[derive(Default)]
pub struct GraphLog {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub connections: Mutex<Vec<(String, f64)>>,
    pub settings_seen: Mutex<Option<GraphSettings>>,
}

pub struct MockGraphFactory {
    pub log: Arc<GraphLog>,
    fail: bool,
}

impl MockGraphFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::new(GraphLog::default()),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl AudioGraphFactory for MockGraphFactory {
    fn create_graph(&self, settings: &GraphSettings) -> RecastResult<Box<dyn AudioGraph>> {
        if self.fail {
            return Err(RecastError::mixing("processing context refused to open"));
        }
        self.log.created.fetch_add(1, Ordering::SeqCst);
        *self.log.settings_seen.lock() = Some(*settings);
        Ok(Box::new(MockGraph {
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockGraph {
    log: Arc<GraphLog>,
}

impl AudioGraph for MockGraph {
    fn connect_source(&mut self, track: &Arc<dyn MediaTrack>, gain: f64) -> RecastResult<()> {
        self.log
            .connections
            .lock()
            .push((track.id().to_string(), gain));
        Ok(())
    }

    fn output_track(&mut self) -> RecastResult<Arc<dyn MediaTrack>> {
        Ok(Arc::new(MockTrack::audio("mixed-output")))
    }

    fn close(&mut self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// Encoder

/// How a scripted encoder behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderScript {
    /// One chunk per interval, a final chunk plus `Finished` on stop.
    Chunks,
    /// No chunks at all, `Finished` on stop.
    NoData,
    /// One chunk, then a fatal error.
    ErrorAfterFirstChunk,
}

pub struct CreatedEncoder {
    pub track_ids: Vec<String>,
    pub mime_type: String,
    pub plan: BitratePlan,
}

pub struct MockEncoderFactory {
    script: EncoderScript,
    supports: fn(&CodecChoice) -> bool,
    create_fails: bool,
    pub created: Mutex<Vec<CreatedEncoder>>,
    pub stop_calls: Arc<AtomicUsize>,
}

impl MockEncoderFactory {
    pub fn new(script: EncoderScript) -> Self {
        Self {
            script,
            supports: |_| true,
            create_fails: false,
            created: Mutex::new(Vec::new()),
            stop_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn supporting(mut self, supports: fn(&CodecChoice) -> bool) -> Self {
        self.supports = supports;
        self
    }

    /// Fail creation with an untyped transport error.
    pub fn failing_creation(mut self) -> Self {
        self.create_fails = true;
        self
    }
}

impl EncoderFactory for MockEncoderFactory {
    fn is_supported(&self, codec: &CodecChoice) -> bool {
        (self.supports)(codec)
    }

    fn create(
        &self,
        tracks: &[Arc<dyn MediaTrack>],
        codec: &CodecChoice,
        bitrates: &BitratePlan,
    ) -> RecastResult<Arc<dyn StreamEncoder>> {
        if self.create_fails {
            return Err(RecastError::Io(std::io::Error::other(
                "encoder spool unavailable",
            )));
        }
        self.created.lock().push(CreatedEncoder {
            track_ids: track_ids(tracks),
            mime_type: codec.mime_type(),
            plan: *bitrates,
        });
        Ok(Arc::new(MockEncoder {
            script: self.script,
            stopped: watch::channel(false).0,
            stop_calls: Arc::clone(&self.stop_calls),
        }))
    }
}

struct MockEncoder {
    script: EncoderScript,
    stopped: watch::Sender<bool>,
    stop_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamEncoder for MockEncoder {
    async fn start(&self, chunk_interval: Duration) -> RecastResult<mpsc::Receiver<EncoderEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let script = self.script;
        let mut stopped = self.stopped.subscribe();

        tokio::spawn(async move {
            let first = tokio::time::Instant::now() + chunk_interval;
            let mut ticker = tokio::time::interval_at(first, chunk_interval);
            let mut emitted = 0u32;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if script == EncoderScript::NoData {
                            continue;
                        }
                        emitted += 1;
                        if tx.send(EncoderEvent::Chunk(vec![emitted as u8; 8])).await.is_err() {
                            return;
                        }
                        if script == EncoderScript::ErrorAfterFirstChunk {
                            let _ = tx
                                .send(EncoderEvent::Error("bitstream corrupted".to_string()))
                                .await;
                            return;
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            if script == EncoderScript::Chunks {
                                let _ = tx.send(EncoderEvent::Chunk(vec![0xFF; 4])).await;
                            }
                            let _ = tx.send(EncoderEvent::Finished).await;
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> RecastResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.send_replace(true);
        Ok(())
    }
}

// Assembly helpers

pub struct Mocks {
    pub display: Arc<MockDisplaySource>,
    pub microphone: Arc<MockMicrophoneSource>,
    pub graph: Arc<MockGraphFactory>,
    pub encoder: Arc<MockEncoderFactory>,
}

impl Mocks {
    pub fn backends(&self) -> BackendSet {
        BackendSet {
            display: Arc::clone(&self.display) as _,
            microphone: Arc::clone(&self.microphone) as _,
            audio_graph: Arc::clone(&self.graph) as _,
            encoder: Arc::clone(&self.encoder) as _,
        }
    }
}

pub fn mocks(display: MockDisplaySource, microphone: MockMicrophoneSource) -> Mocks {
    Mocks {
        display: Arc::new(display),
        microphone: Arc::new(microphone),
        graph: Arc::new(MockGraphFactory::new()),
        encoder: Arc::new(MockEncoderFactory::new(EncoderScript::Chunks)),
    }
}
