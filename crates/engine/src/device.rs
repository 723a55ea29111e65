//! Microphone device preference.
//!
//! The last-chosen microphone id is the only state Recast persists
//! across sessions. It is validated against the live device list before
//! use; a stale id is silently ignored in favor of the default device.

use recast_common::AppConfig;

use crate::backend::AudioInputDevice;

/// Resolve the stored microphone preference against the enumerated
/// device list. Returns `None` (use the default device) when nothing is
/// stored or the stored id no longer matches an attached device.
pub fn resolve_microphone_preference(
    stored: Option<&str>,
    devices: &[AudioInputDevice],
) -> Option<String> {
    let id = stored?;
    if devices.iter().any(|d| d.id == id) {
        Some(id.to_string())
    } else {
        tracing::debug!(device = id, "Stored microphone no longer attached; using default");
        None
    }
}

/// Persist a newly selected microphone id.
pub fn remember_microphone(config: &mut AppConfig, device_id: &str) -> std::io::Result<()> {
    config.microphone_device_id = Some(device_id.to_string());
    config.save()
}
