//! Startup wiring and worker supervision
//!
//! Resolves configured captures against the enumerated devices, opens
//! and optionally grabs them, negotiates the virtual device capability
//! set, then runs one remap worker per capture until all have stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use evdev::Device;
use keymux_config::{CaptureConfig, Config};
use tokio::task::JoinSet;

use crate::capability;
use crate::device::{self, DeviceInfo};
use crate::injector::VirtualDevice;
use crate::remapper::{self, DeviceSource, RuleTable};

/// Match configured captures against enumerated devices by exact name.
///
/// The first enumerated device with the configured name wins. A capture
/// matching no device is skipped with a warning; it contributes no
/// worker and does not fail startup.
pub fn resolve_captures<'a>(
    captures: &'a [CaptureConfig],
    available: &'a [DeviceInfo],
) -> Vec<(&'a CaptureConfig, &'a DeviceInfo)> {
    let mut resolved = Vec::new();
    for capture in captures {
        match available.iter().find(|info| info.name == capture.name) {
            Some(info) => resolved.push((capture, info)),
            None => {
                tracing::warn!(
                    "No input device named '{}' found, skipping capture",
                    capture.name
                );
            }
        }
    }
    resolved
}

pub async fn run(config: Config) -> Result<()> {
    let available = device::enumerate_devices().context("Failed to enumerate input devices")?;
    let resolved = resolve_captures(&config.captures, &available);

    if resolved.is_empty() {
        tracing::warn!("No configured capture device is present; nothing to forward");
        return Ok(());
    }

    // Open every capture before the virtual device is created, so its
    // capabilities can be unioned. Drop closes anything already opened
    // if a later step fails.
    let mut opened = Vec::with_capacity(resolved.len());
    for (capture, info) in resolved {
        let mut device = Device::open(&info.path)
            .with_context(|| format!("Failed to open device at {}", info.path.display()))?;
        if capture.grab {
            device.grab().with_context(|| {
                format!(
                    "Failed to grab device '{}' for exclusive access. \
                     Is another application using this device?",
                    info.name
                )
            })?;
        }
        tracing::info!("Capturing '{}' at {}", info.name, info.path.display());
        opened.push((capture, device, info.name.clone()));
    }

    let mut caps = capability::negotiate(opened.iter().map(|(_, device, _)| device));
    caps.insert_key_codes(config.rewrite_codes());

    let sink = Arc::new(
        VirtualDevice::create(&config.global.device_name, &caps)
            .context("Failed to create virtual device")?,
    );

    let mut workers = JoinSet::new();
    for (capture, device, name) in opened {
        let stream = device
            .into_event_stream()
            .with_context(|| format!("Failed to create event stream for '{}'", name))?;
        let table = RuleTable::from_capture(capture);
        workers.spawn(remapper::run_worker(
            name,
            DeviceSource::new(stream),
            table,
            sink.clone(),
        ));
    }

    // A worker stopping (device unplugged, write failure) never stops
    // its siblings; the process ends once every stream has ended.
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Worker task failed: {}", e);
        }
    }

    tracing::info!("All workers stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(path: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            path: PathBuf::from(path),
            name: name.to_string(),
            vendor: 0,
            product: 0,
        }
    }

    #[test]
    fn test_resolve_first_enumerated_device_wins() {
        let captures = vec![CaptureConfig::new("kbd")];
        let available = vec![
            info("/dev/input/event2", "kbd"),
            info("/dev/input/event5", "kbd"),
        ];

        let resolved = resolve_captures(&captures, &available);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].1.path, PathBuf::from("/dev/input/event2"));
    }

    #[test]
    fn test_resolve_skips_unmatched_captures() {
        let captures = vec![CaptureConfig::new("kbd"), CaptureConfig::new("missing")];
        let available = vec![info("/dev/input/event2", "kbd")];

        let resolved = resolve_captures(&captures, &available);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0.name, "kbd");
    }

    #[test]
    fn test_resolve_requires_exact_name() {
        let captures = vec![CaptureConfig::new("kbd")];
        let available = vec![info("/dev/input/event2", "kbd extra")];

        assert!(resolve_captures(&captures, &available).is_empty());
    }
}
