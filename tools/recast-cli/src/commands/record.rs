//! Record the screen to a file.

use std::path::PathBuf;

use recast_common::AppConfig;
use recast_engine::device::resolve_microphone_preference;
use recast_engine::{CaptureSession, PlatformClass, SessionOptions, SessionState};

pub async fn run(
    output: PathBuf,
    mic: bool,
    system_audio: bool,
    mic_device: Option<String>,
    config: AppConfig,
) -> anyhow::Result<()> {
    let backends = recast_backend_gst::backend_set();
    let platform = PlatformClass::detect();

    // Explicit --mic-device wins; otherwise the stored preference is
    // validated against the live device list.
    let microphone_device_id = if !mic {
        None
    } else if mic_device.is_some() {
        mic_device
    } else {
        match backends.microphone.enumerate_devices().await {
            Ok(devices) => {
                resolve_microphone_preference(config.microphone_device_id.as_deref(), &devices)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Device enumeration failed; using the default microphone");
                None
            }
        }
    };

    println!("Recording the screen");
    println!("  Output: {}", output.display());
    println!("  Microphone: {mic}");
    println!("  System audio: {system_audio}");
    if let Some(device) = &microphone_device_id {
        println!("  Microphone device: {device}");
    }
    println!();

    let session = CaptureSession::new(backends, platform);
    session
        .start(SessionOptions {
            want_system_audio: system_audio,
            want_microphone: mic,
            microphone_device_id,
        })
        .await?;

    if let Some(message) = session.message() {
        println!("Warning: {message}");
    }
    println!("Recording... press Ctrl+C to stop.");

    let mut states = session.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            session.stop().await?;
        }
        _ = states.wait_for(|s| s.is_terminal()) => {}
    }

    match session.state() {
        SessionState::Completed => {
            let artifact = session
                .artifact()
                .ok_or_else(|| anyhow::anyhow!("Completed session without an artifact"))?;
            let path = output.join(artifact.suggested_file_name());
            tokio::fs::create_dir_all(&output).await?;
            tokio::fs::write(&path, &artifact.data).await?;
            println!(
                "Saved {} ({} seconds, {} bytes)",
                path.display(),
                session.elapsed_secs(),
                artifact.data.len()
            );
            Ok(())
        }
        SessionState::Failed => {
            let message = session
                .failure()
                .map(|f| f.message)
                .unwrap_or_else(|| "Recording failed".to_string());
            anyhow::bail!("{message}")
        }
        state => anyhow::bail!("Session ended in unexpected state {state:?}"),
    }
}
