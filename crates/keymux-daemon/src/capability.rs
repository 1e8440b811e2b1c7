//! Capability negotiation for the virtual device
//!
//! The virtual device must declare every event type and code it may ever
//! emit before it is created; the kernel silently drops writes for
//! undeclared codes. The negotiated set is the union of every capture
//! device's capability bitmasks, plus every rewrite target code from the
//! loaded rules.

use std::collections::{BTreeMap, BTreeSet};

use evdev::{Device, EventType};

/// Union of (event type, code) capability bits.
///
/// Stored as sorted sets, so the result is independent of the order in
/// which devices are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    types: BTreeSet<u16>,
    codes: BTreeMap<u16, BTreeSet<u16>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the capability bitmasks of one open source device.
    pub fn from_device(device: &Device) -> Self {
        let mut caps = Self::new();

        for event_type in device.supported_events().iter() {
            caps.insert_type(event_type);
        }
        if let Some(keys) = device.supported_keys() {
            for key in keys.iter() {
                caps.insert_code(EventType::KEY, key.code());
            }
        }
        if let Some(axes) = device.supported_relative_axes() {
            for axis in axes.iter() {
                caps.insert_code(EventType::RELATIVE, axis.0);
            }
        }
        if let Some(axes) = device.supported_absolute_axes() {
            for axis in axes.iter() {
                caps.insert_code(EventType::ABSOLUTE, axis.0);
            }
        }
        if let Some(misc) = device.misc_properties() {
            for prop in misc.iter() {
                caps.insert_code(EventType::MISC, prop.0);
            }
        }
        if let Some(switches) = device.supported_switches() {
            for switch in switches.iter() {
                caps.insert_code(EventType::SWITCH, switch.0);
            }
        }
        if let Some(leds) = device.supported_leds() {
            for led in leds.iter() {
                caps.insert_code(EventType::LED, led.0);
            }
        }
        if let Some(sounds) = device.supported_sounds() {
            for sound in sounds.iter() {
                caps.insert_code(EventType::SOUND, sound.0);
            }
        }
        if let Some(effects) = device.supported_ff() {
            for effect in effects.iter() {
                caps.insert_code(EventType::FORCEFEEDBACK, effect.0);
            }
        }

        caps
    }

    /// Enable an event type with no code-level entry (sync, repeat,
    /// power, force-feedback-status).
    pub fn insert_type(&mut self, event_type: EventType) {
        self.types.insert(event_type.0);
    }

    /// Enable one code; implies enabling its event type.
    pub fn insert_code(&mut self, event_type: EventType, code: u16) {
        self.types.insert(event_type.0);
        self.codes.entry(event_type.0).or_default().insert(code);
    }

    /// Bitwise-OR another capability set into this one.
    pub fn merge(&mut self, other: &CapabilitySet) {
        self.types.extend(other.types.iter().copied());
        for (event_type, codes) in &other.codes {
            self.codes
                .entry(*event_type)
                .or_default()
                .extend(codes.iter().copied());
        }
    }

    /// Enable key codes referenced only as rewrite targets.
    pub fn insert_key_codes<I: IntoIterator<Item = u16>>(&mut self, codes: I) {
        for code in codes {
            self.insert_code(EventType::KEY, code);
        }
    }

    pub fn supports_type(&self, event_type: EventType) -> bool {
        self.types.contains(&event_type.0)
    }

    pub fn contains_code(&self, event_type: EventType, code: u16) -> bool {
        self.codes
            .get(&event_type.0)
            .map(|codes| codes.contains(&code))
            .unwrap_or(false)
    }

    /// Enabled codes for an event type, ascending.
    pub fn codes(&self, event_type: EventType) -> impl Iterator<Item = u16> + '_ {
        self.codes
            .get(&event_type.0)
            .into_iter()
            .flat_map(|codes| codes.iter().copied())
    }
}

/// Union the capability bits of all open capture devices.
pub fn negotiate<'a, I>(devices: I) -> CapabilitySet
where
    I: IntoIterator<Item = &'a Device>,
{
    let mut caps = CapabilitySet::new();
    for device in devices {
        caps.merge(&CapabilitySet::from_device(device));
    }
    caps
}
