//! Event rewrite engine
//!
//! One `RemapWorker` runs per capture device. Each event read from the
//! source is matched against that device's ordered rule buckets and
//! forwarded to the shared virtual device, either unchanged or rewritten
//! (optionally followed by a synthesized release of the original code).

use std::io;
use std::sync::Arc;

use evdev::{EventStream, EventType};
use keymux_config::{CaptureConfig, EventMap, IGNORE_VALUE};

/// One event record headed for the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

/// Source of raw (type, code, value) records for one worker.
pub trait EventSource {
    async fn next_event(&mut self) -> io::Result<(u16, u16, i32)>;
}

/// The event stream of one opened capture device.
pub struct DeviceSource {
    stream: EventStream,
}

impl DeviceSource {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }
}

impl EventSource for DeviceSource {
    async fn next_event(&mut self) -> io::Result<(u16, u16, i32)> {
        let event = self.stream.next_event().await?;
        Ok((event.event_type().0, event.code(), event.value()))
    }
}

/// Write side of the shared virtual device.
pub trait EventSink {
    fn emit(&self, event: &OutputEvent) -> io::Result<()>;
}

/// Per-device remap rules, indexed by event type. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    buckets: Vec<Vec<EventMap>>,
}

impl RuleTable {
    pub fn from_capture(capture: &CaptureConfig) -> Self {
        Self {
            buckets: capture.buckets.clone(),
        }
    }

    /// Map one incoming event to the events to forward.
    ///
    /// An event whose type has no rule bucket, or matches no rule in its
    /// bucket, passes through unchanged. The first matching rule wins
    /// and fully replaces the event with a key event carrying the
    /// rewrite code; `send_release` additionally synthesizes a release
    /// of the original type/code after the rewritten event.
    pub fn apply(&self, event_type: u16, code: u16, value: i32) -> Vec<OutputEvent> {
        let passthrough = OutputEvent {
            event_type,
            code,
            value,
        };

        let Some(bucket) = self.buckets.get(usize::from(event_type)) else {
            return vec![passthrough];
        };
        let Some(rule) = bucket.iter().find(|rule| rule.matches(code, value)) else {
            return vec![passthrough];
        };

        let rewritten = OutputEvent {
            event_type: EventType::KEY.0,
            code: rule.rewrite_code,
            value: if rule.rewrite_value == IGNORE_VALUE {
                value
            } else {
                i32::from(rule.rewrite_value)
            },
        };

        let mut forwarded = vec![rewritten];
        if rule.send_release {
            forwarded.push(OutputEvent {
                event_type,
                code,
                value: 0,
            });
        }
        forwarded
    }
}

/// Read, rewrite and forward events from one capture device until its
/// stream ends.
///
/// A read or write failure ends this worker only; sibling workers and
/// the shared virtual device are unaffected.
pub async fn run_worker<S, K>(device_name: String, mut source: S, table: RuleTable, sink: Arc<K>)
where
    S: EventSource,
    K: EventSink,
{
    tracing::info!("Worker started for '{}'", device_name);

    loop {
        let (event_type, code, value) = match source.next_event().await {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Read from '{}' failed, stopping worker: {}", device_name, e);
                return;
            }
        };

        for forwarded in table.apply(event_type, code, value) {
            if let Err(e) = sink.emit(&forwarded) {
                tracing::warn!(
                    "Write to virtual device failed, stopping worker for '{}': {}",
                    device_name,
                    e
                );
                return;
            }
        }
    }
}
