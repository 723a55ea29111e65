//! Capture session management.
//!
//! One [`CaptureSession`] is one attempt to record the screen plus up to
//! two audio sources, from `start()` to a completed artifact or a
//! failure. The session exclusively owns every track it acquires and
//! releases all of them on every terminal path.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use recast_common::{ErrorKind, RecastError, RecastResult, RecordingClock};

use crate::artifact::Artifact;
use crate::backend::{BackendSet, EncoderEvent, MediaTrack, StreamEncoder};
use crate::mixer::{AudioMixGraph, MixedOutput};
use crate::policy::{self, PlatformClass};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    /// No session underway.
    Idle,
    /// Waiting on the microphone permission prompt / device open.
    AcquiringMicrophone,
    /// Waiting on the display share prompt / capture start.
    AcquiringDisplay,
    /// Building the audio mix graph.
    Mixing,
    /// Encoder running, chunks accumulating.
    Recording,
    /// Stop requested, encoder flushing.
    Stopping,
    /// Artifact assembled, all tracks released.
    Completed,
    /// Fatal failure, all tracks released.
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Immutable options snapshot taken at `start()`.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub want_system_audio: bool,
    pub want_microphone: bool,
    pub microphone_device_id: Option<String>,
}

/// Which audio composition path the session took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixPath {
    /// No audio track was acquired.
    NoAudio,
    /// A single audio track fed the encoder unmodified.
    Single,
    /// Both tracks were merged through the mix graph.
    Mixed,
    /// Mixing failed; all raw tracks were unioned unmixed. The container
    /// then carries two audio tracks, which not every player handles —
    /// preserved deliberately rather than re-deriving a single track.
    FallbackUnion,
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_secs(1);

struct Inner {
    state: SessionState,
    options: SessionOptions,
    /// Latest user-visible message, fatal or not. Latest wins.
    message: Option<String>,
    /// When the session entered Recording, on the runtime clock.
    recording_started: Option<tokio::time::Instant>,
    /// Elapsed seconds captured on exit from Recording.
    elapsed_frozen: Option<u64>,
    chunks: Vec<Vec<u8>>,
    had_system_audio: bool,
    mix_path: Option<MixPath>,
    mime_type: String,

    video_track: Option<Arc<dyn MediaTrack>>,
    display_audio: Option<Arc<dyn MediaTrack>>,
    mic_track: Option<Arc<dyn MediaTrack>>,
    composed: Vec<Arc<dyn MediaTrack>>,
    mix_output: Option<MixedOutput>,
    encoder: Option<Arc<dyn StreamEncoder>>,
    clock: Option<RecordingClock>,

    artifact: Option<Artifact>,
    failure: Option<Failure>,

    watcher: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            options: SessionOptions::default(),
            message: None,
            recording_started: None,
            elapsed_frozen: None,
            chunks: Vec::new(),
            had_system_audio: false,
            mix_path: None,
            mime_type: String::new(),
            video_track: None,
            display_audio: None,
            mic_track: None,
            composed: Vec::new(),
            mix_output: None,
            encoder: None,
            clock: None,
            artifact: None,
            failure: None,
            watcher: None,
            pump: None,
        }
    }

    /// Whole seconds recorded. Derived from the recording start instant
    /// rather than counted, so a reader at a second boundary always sees
    /// the boundary value.
    fn elapsed_secs(&self) -> u64 {
        if let Some(frozen) = self.elapsed_frozen {
            return frozen;
        }
        self.recording_started
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Pin the elapsed counter at its current value. Idempotent; the
    /// first freeze wins.
    fn freeze_elapsed(&mut self) {
        if self.elapsed_frozen.is_none() && self.recording_started.is_some() {
            self.elapsed_frozen = Some(self.elapsed_secs());
        }
    }

    /// Reset for a fresh attempt. Only called from Idle.
    fn reset(&mut self, options: SessionOptions) {
        debug_assert_eq!(self.state, SessionState::Idle);
        let pump = self.pump.take();
        *self = Self::new();
        // A previous attempt's pump has already exited by the time the
        // session is back in Idle; dropping the handle detaches it.
        drop(pump);
        self.options = options;
    }

    /// Stop every owned track, close the mix graph, cancel the watcher
    /// task. Safe to call more than once.
    fn release_resources(&mut self) {
        self.freeze_elapsed();
        for track in self
            .video_track
            .iter()
            .chain(self.display_audio.iter())
            .chain(self.mic_track.iter())
            .chain(self.composed.iter())
        {
            track.stop();
        }
        if let Some(mut mix) = self.mix_output.take() {
            mix.close();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// A capture session. At most one may be in a non-terminal state; the
/// engine enforces this by only accepting `start()` from Idle.
pub struct CaptureSession {
    deps: BackendSet,
    platform: PlatformClass,
    chunk_interval: Duration,
    inner: Arc<Mutex<Inner>>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl CaptureSession {
    pub fn new(deps: BackendSet, platform: PlatformClass) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            deps,
            platform,
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            inner: Arc::new(Mutex::new(Inner::new())),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Override the encoder chunk interval (default one second).
    pub fn with_chunk_interval(mut self, interval: Duration) -> Self {
        self.chunk_interval = interval;
        self
    }

    // Observable state

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Whole seconds recorded so far. Advances only while Recording and
    /// freezes on the transition out of it.
    pub fn elapsed_secs(&self) -> u64 {
        self.inner.lock().elapsed_secs()
    }

    /// Latest user-visible message (warning or failure), if any.
    pub fn message(&self) -> Option<String> {
        self.inner.lock().message.clone()
    }

    pub fn artifact(&self) -> Option<Artifact> {
        self.inner.lock().artifact.clone()
    }

    pub fn failure(&self) -> Option<Failure> {
        self.inner.lock().failure.clone()
    }

    /// Whether system audio was actually captured this attempt.
    pub fn had_system_audio(&self) -> bool {
        self.inner.lock().had_system_audio
    }

    pub fn mix_path(&self) -> Option<MixPath> {
        self.inner.lock().mix_path
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    // Lifecycle

    /// Start a recording attempt.
    ///
    /// Rejected without any state change when a session is already
    /// underway (including un-cleared terminal states). On success the
    /// session is Recording when this returns; on failure it is Failed
    /// with every partially acquired track released.
    pub async fn start(&self, options: SessionOptions) -> RecastResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                return Err(RecastError::session(
                    "a capture session is already active; clear it before starting another",
                ));
            }
            inner.reset(options.clone());
        }

        match self.run_start(options).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Stop recording and wait for the encoder flush.
    ///
    /// No-op unless Recording; calling twice has the effect of one call.
    pub async fn stop(&self) -> RecastResult<()> {
        let encoder = match Self::begin_stop(&self.inner, &self.state_tx) {
            Some(encoder) => encoder,
            None => return Ok(()),
        };

        if let Err(err) = encoder.stop().await {
            tracing::warn!(error = %err, "Encoder stop reported an error");
        }
        self.wait_terminal().await;
        Ok(())
    }

    /// Discard a finished session and return to Idle.
    ///
    /// Valid from Completed or Failed; a no-op from Idle.
    pub fn clear(&self) -> RecastResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Idle => Ok(()),
            SessionState::Completed | SessionState::Failed => {
                inner.release_resources();
                inner.state = SessionState::Idle;
                let options = SessionOptions::default();
                inner.reset(options);
                self.state_tx.send_replace(SessionState::Idle);
                Ok(())
            }
            _ => Err(RecastError::session(
                "clear is only valid once the session has finished",
            )),
        }
    }

    /// Wait until the session reaches Completed, Failed, or Idle.
    pub async fn wait_terminal(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx
            .wait_for(|s| s.is_terminal() || *s == SessionState::Idle)
            .await;
    }

    // Internals

    async fn run_start(&self, options: SessionOptions) -> RecastResult<()> {
        if !self.deps.display.is_available() {
            return Err(RecastError::unsupported(
                "display capture is not available on this host",
            ));
        }
        if !self.deps.display.is_secure_context() {
            return Err(RecastError::insecure_context(
                "screen capture requires a trusted context",
            ));
        }

        tracing::info!(
            platform = ?self.platform,
            system_audio = options.want_system_audio,
            microphone = options.want_microphone,
            "Starting capture session"
        );

        // Microphone first, display second: the two prompts must never
        // race for the user's attention, and a microphone refusal must
        // not block the display share.
        if options.want_microphone {
            self.set_state(SessionState::AcquiringMicrophone);
            let constraints = policy::microphone_constraints(
                self.platform,
                options.microphone_device_id.as_deref(),
            );
            match self.deps.microphone.request_microphone(&constraints).await {
                Ok(track) => {
                    tracing::info!(track = track.id(), "Microphone acquired");
                    self.inner.lock().mic_track = Some(track);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Microphone unavailable; continuing without it");
                    self.inner.lock().message = Some(MIC_WARNING.to_string());
                }
            }
        }

        self.set_state(SessionState::AcquiringDisplay);
        let constraints = policy::capture_constraints(self.platform, options.want_system_audio);
        let capture = self.deps.display.request_display(&constraints).await?;
        let video = Arc::clone(&capture.video);
        let had_system_audio = capture.audio.is_some();
        {
            let mut inner = self.inner.lock();
            inner.video_track = Some(Arc::clone(&capture.video));
            inner.display_audio = capture.audio;
            inner.had_system_audio = had_system_audio;
            if options.want_system_audio && !had_system_audio {
                // The source refused audio; user-visible immediately,
                // not only after stop.
                inner.message = Some(SYSTEM_AUDIO_WARNING.to_string());
            }
        }
        tracing::info!(had_system_audio, "Display capture acquired");

        self.set_state(SessionState::Mixing);
        let (system, microphone) = {
            let inner = self.inner.lock();
            (inner.display_audio.clone(), inner.mic_track.clone())
        };
        let mut composed: Vec<Arc<dyn MediaTrack>> = vec![Arc::clone(&video)];
        let mix_path = match (&system, &microphone) {
            (None, None) => MixPath::NoAudio,
            _ => match AudioMixGraph::mix(
                self.deps.audio_graph.as_ref(),
                self.platform,
                system.as_ref(),
                microphone.as_ref(),
            ) {
                Ok(output) => {
                    let mixed = output.is_mixed();
                    composed.push(Arc::clone(&output.track));
                    self.inner.lock().mix_output = Some(output);
                    if mixed {
                        MixPath::Mixed
                    } else {
                        MixPath::Single
                    }
                }
                Err(err) => {
                    // Recoverable by design: record every raw track
                    // unmixed instead of aborting the session.
                    tracing::warn!(error = %err, "Audio mixing failed; using unmixed track union");
                    composed.extend(system.iter().cloned());
                    composed.extend(microphone.iter().cloned());
                    MixPath::FallbackUnion
                }
            },
        };
        tracing::info!(?mix_path, tracks = composed.len(), "Track set composed");

        let settings = video.video_settings().unwrap_or_default();
        let plan = policy::bitrate_plan(settings.width, settings.height, self.platform);
        let codec = policy::negotiate_codec(self.platform, |c| self.deps.encoder.is_supported(c));
        tracing::info!(
            mime = %codec.mime_type(),
            video_bps = plan.video_bps,
            audio_bps = plan.audio_bps,
            width = settings.width,
            height = settings.height,
            "Encoder negotiated"
        );

        let encoder = self.deps.encoder.create(&composed, &codec, &plan)?;
        let events = encoder.start(self.chunk_interval).await?;

        {
            let mut inner = self.inner.lock();
            inner.mime_type = codec.mime_type();
            inner.mix_path = Some(mix_path);
            inner.composed = composed;
            inner.encoder = Some(Arc::clone(&encoder));
            inner.clock = Some(RecordingClock::start());
            inner.recording_started = Some(tokio::time::Instant::now());
        }

        self.spawn_pump(events, Arc::clone(&encoder));
        self.spawn_end_watcher(video);

        self.set_state(SessionState::Recording);
        tracing::info!("Recording started");
        Ok(())
    }

    /// Transition Recording → Stopping and hand back the encoder to
    /// flush. Returns `None` when there is nothing to stop, which makes
    /// every stop trigger (explicit, external track end) idempotent.
    fn begin_stop(
        inner: &Arc<Mutex<Inner>>,
        state_tx: &watch::Sender<SessionState>,
    ) -> Option<Arc<dyn StreamEncoder>> {
        let mut guard = inner.lock();
        if guard.state != SessionState::Recording {
            return None;
        }
        guard.state = SessionState::Stopping;
        state_tx.send_replace(SessionState::Stopping);
        guard.freeze_elapsed();
        if let Some(clock) = &guard.clock {
            tracing::info!(duration_secs = clock.elapsed_secs(), "Stopping recording");
        }
        guard.encoder.clone()
    }

    fn spawn_pump(
        &self,
        mut events: tokio::sync::mpsc::Receiver<EncoderEvent>,
        encoder: Arc<dyn StreamEncoder>,
    ) {
        let inner = Arc::clone(&self.inner);
        let state_tx = Arc::clone(&self.state_tx);
        let platform = self.platform;

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Some(EncoderEvent::Chunk(data)) => {
                        if data.is_empty() {
                            continue;
                        }
                        let mut guard = inner.lock();
                        if matches!(
                            guard.state,
                            SessionState::Recording | SessionState::Stopping
                        ) {
                            guard.chunks.push(data);
                        }
                    }
                    Some(EncoderEvent::Error(detail)) => {
                        tracing::error!(%detail, "Encoder reported a fatal error");
                        {
                            let mut guard = inner.lock();
                            let message = encoding_failure_message(platform);
                            guard.release_resources();
                            guard.failure = Some(Failure {
                                kind: ErrorKind::EncodingFailed,
                                message: message.clone(),
                            });
                            guard.message = Some(message);
                            guard.state = SessionState::Failed;
                            state_tx.send_replace(SessionState::Failed);
                        }
                        let _ = encoder.stop().await;
                        break;
                    }
                    Some(EncoderEvent::Finished) | None => {
                        Self::finalize(&inner, &state_tx);
                        break;
                    }
                }
            }
        });
        self.inner.lock().pump = Some(handle);
    }

    /// Assemble the artifact (or fail with EmptyRecording) once the
    /// encoder has flushed.
    fn finalize(inner: &Arc<Mutex<Inner>>, state_tx: &watch::Sender<SessionState>) {
        let mut guard = inner.lock();
        if !matches!(
            guard.state,
            SessionState::Recording | SessionState::Stopping
        ) {
            return;
        }
        guard.release_resources();

        if guard.chunks.is_empty() {
            tracing::warn!("Encoder flushed without producing any data");
            let message = "Recording produced no data.".to_string();
            guard.failure = Some(Failure {
                kind: ErrorKind::EmptyRecording,
                message: message.clone(),
            });
            guard.message = Some(message);
            guard.state = SessionState::Failed;
            state_tx.send_replace(SessionState::Failed);
        } else {
            let artifact =
                Artifact::assemble(&guard.chunks, guard.mime_type.clone(), guard.had_system_audio);
            tracing::info!(
                bytes = artifact.data.len(),
                chunks = guard.chunks.len(),
                mime = %artifact.mime_type,
                "Recording completed"
            );
            guard.artifact = Some(artifact);
            guard.state = SessionState::Completed;
            state_tx.send_replace(SessionState::Completed);
        }
    }

    /// Treat the video track ending externally (the user revoking
    /// sharing) exactly like an explicit stop.
    fn spawn_end_watcher(&self, video: Arc<dyn MediaTrack>) {
        let inner = Arc::clone(&self.inner);
        let state_tx = Arc::clone(&self.state_tx);
        let handle = tokio::spawn(async move {
            video.wait_ended().await;
            tracing::info!("Video track ended externally; stopping session");
            if let Some(encoder) = Self::begin_stop(&inner, &state_tx) {
                if let Err(err) = encoder.stop().await {
                    tracing::warn!(error = %err, "Encoder stop reported an error");
                }
            }
        });
        self.inner.lock().watcher = Some(handle);
    }

    fn fail(&self, err: &RecastError) {
        let kind = err.kind().unwrap_or_else(|| self.default_kind());
        let message = failure_message(kind, self.platform);
        tracing::error!(%kind, error = %err, "Capture session failed");

        let mut guard = self.inner.lock();
        guard.release_resources();
        guard.failure = Some(Failure {
            kind,
            message: message.clone(),
        });
        guard.message = Some(message);
        guard.state = SessionState::Failed;
        self.state_tx.send_replace(SessionState::Failed);
    }

    /// Taxonomy bucket for errors that carry no kind of their own,
    /// chosen by the phase the session failed in: acquisition failures
    /// read as a missing source, everything after the mix starts is
    /// encoder setup.
    fn default_kind(&self) -> ErrorKind {
        match self.inner.lock().state {
            SessionState::Mixing => ErrorKind::EncodingFailed,
            _ => ErrorKind::NoSourceAvailable,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.inner.lock().state = state;
        self.state_tx.send_replace(state);
    }
}

const MIC_WARNING: &str =
    "Could not access microphone. Recording will continue without microphone audio.";

const SYSTEM_AUDIO_WARNING: &str =
    "System audio was not captured. Make sure the selected source allows audio sharing.";

/// Human-readable guidance per failure kind.
fn failure_message(kind: ErrorKind, platform: PlatformClass) -> String {
    match kind {
        ErrorKind::PermissionDenied => {
            "Permission denied. Allow screen recording, and enable audio sharing if you want system audio.".to_string()
        }
        ErrorKind::NoSourceAvailable => {
            "No screen available to record. Make sure a display is connected.".to_string()
        }
        ErrorKind::UserCancelled => {
            "Screen sharing was cancelled. Try again and pick a screen or window to share."
                .to_string()
        }
        ErrorKind::Unsupported => {
            "Screen recording is not supported in this environment.".to_string()
        }
        ErrorKind::InsecureContext => {
            "Screen recording requires a trusted context.".to_string()
        }
        ErrorKind::MixingFailed => {
            "Audio mixing failed. Recording continues with unmixed audio.".to_string()
        }
        ErrorKind::EncodingFailed => encoding_failure_message(platform),
        ErrorKind::EmptyRecording => "Recording produced no data.".to_string(),
    }
}

fn encoding_failure_message(platform: PlatformClass) -> String {
    match platform {
        PlatformClass::Constrained => {
            "Recording error occurred. Try lowering the display resolution, closing other video applications, or disabling hardware acceleration.".to_string()
        }
        PlatformClass::Default => "Recording error occurred. Please try again.".to_string(),
    }
}
