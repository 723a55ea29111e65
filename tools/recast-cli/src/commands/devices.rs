//! List audio input devices and manage the microphone preference.

use recast_common::AppConfig;
use recast_engine::device::remember_microphone;

pub async fn run(use_device: Option<String>, mut config: AppConfig) -> anyhow::Result<()> {
    let backends = recast_backend_gst::backend_set();
    let devices = backends.microphone.enumerate_devices().await?;

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    println!("Audio input devices:");
    for device in &devices {
        let marker = if config.microphone_device_id.as_deref() == Some(device.id.as_str()) {
            " (preferred)"
        } else {
            ""
        };
        println!("  {}{marker}", device.id);
    }

    if let Some(id) = use_device {
        if !devices.iter().any(|d| d.id == id) {
            anyhow::bail!("Device {id} is not attached");
        }
        remember_microphone(&mut config, &id)?;
        println!();
        println!("Saved microphone preference: {id}");
    }

    Ok(())
}
