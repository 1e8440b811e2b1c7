//! Virtual device creation and event injection via uinput
//!
//! All remap workers forward into a single virtual device. The device is
//! declared with the negotiated capability union before `UI_DEV_CREATE`,
//! and the full key code space is always force-enabled so rewrite targets
//! work even when no physical source declares them.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use anyhow::{Context, Result};
use evdev::EventType;
use keymux_config::KEY_CODE_COUNT;
use nix::{ioctl_none, ioctl_write_int, ioctl_write_ptr};

use crate::capability::CapabilitySet;
use crate::remapper::{EventSink, OutputEvent};

const UINPUT_PATH: &str = "/dev/uinput";
const UINPUT_MAX_NAME_SIZE: usize = 80;
const BUS_USB: u16 = 0x03;

ioctl_none!(ui_dev_create, b'U', 1);
ioctl_none!(ui_dev_destroy, b'U', 2);
ioctl_write_ptr!(ui_dev_setup, b'U', 3, UinputSetup);
ioctl_write_int!(ui_set_evbit, b'U', 100);
ioctl_write_int!(ui_set_keybit, b'U', 101);
ioctl_write_int!(ui_set_relbit, b'U', 102);
ioctl_write_int!(ui_set_absbit, b'U', 103);
ioctl_write_int!(ui_set_mscbit, b'U', 104);
ioctl_write_int!(ui_set_ledbit, b'U', 105);
ioctl_write_int!(ui_set_sndbit, b'U', 106);
ioctl_write_int!(ui_set_ffbit, b'U', 107);
ioctl_write_int!(ui_set_swbit, b'U', 109);

/// `struct uinput_setup` from linux/uinput.h
#[repr(C)]
pub struct UinputSetup {
    id: libc::input_id,
    name: [u8; UINPUT_MAX_NAME_SIZE],
    ff_effects_max: u32,
}

type SetBitFn = unsafe fn(libc::c_int, libc::c_ulong) -> nix::Result<libc::c_int>;

/// Every evdev event type, with the ioctl that enables one code of its
/// code space. Types without a code space carry no set-bit ioctl.
const CAP_TABLE: &[(EventType, Option<SetBitFn>)] = &[
    (EventType::SYNCHRONIZATION, None),
    (EventType::KEY, Some(ui_set_keybit)),
    (EventType::RELATIVE, Some(ui_set_relbit)),
    (EventType::ABSOLUTE, Some(ui_set_absbit)),
    (EventType::MISC, Some(ui_set_mscbit)),
    (EventType::SWITCH, Some(ui_set_swbit)),
    (EventType::LED, Some(ui_set_ledbit)),
    (EventType::SOUND, Some(ui_set_sndbit)),
    (EventType::REPEAT, None),
    (EventType::FORCEFEEDBACK, Some(ui_set_ffbit)),
    (EventType::POWER, None),
    (EventType::FORCEFEEDBACKSTATUS, None),
];

/// The single synthetic output device for this run, shared across
/// worker tasks behind an `Arc`.
///
/// Each forwarded event is one `write(2)` of a single `input_event`
/// record, which the kernel applies atomically, so the sink needs no
/// lock around `emit`.
pub struct VirtualDevice {
    file: File,
}

impl VirtualDevice {
    /// Create and activate the virtual device.
    ///
    /// Declares the negotiated capability set, force-enables the full
    /// key code space, then runs `UI_DEV_SETUP` + `UI_DEV_CREATE`. Any
    /// failure here is fatal for startup; there is no retry.
    pub fn create(name: &str, caps: &CapabilitySet) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(UINPUT_PATH)
            .with_context(|| format!("Failed to open {}", UINPUT_PATH))?;
        let fd = file.as_raw_fd();

        for (event_type, set_bit) in CAP_TABLE {
            // The virtual device is always usable as a keyboard,
            // whatever the sources support.
            let forced_keyboard = *event_type == EventType::KEY;
            if !caps.supports_type(*event_type) && !forced_keyboard {
                continue;
            }

            unsafe { ui_set_evbit(fd, libc::c_ulong::from(event_type.0)) }
                .with_context(|| format!("UI_SET_EVBIT failed for type {}", event_type.0))?;

            let Some(set_bit) = *set_bit else {
                continue;
            };
            if forced_keyboard {
                // Full key code space (0..=KEY_MAX); rewrite targets are
                // validated against the same bound at load time.
                for code in 0..KEY_CODE_COUNT {
                    unsafe { set_bit(fd, libc::c_ulong::from(code)) }
                        .with_context(|| format!("UI_SET_KEYBIT failed for code {}", code))?;
                }
            } else {
                for code in caps.codes(*event_type) {
                    unsafe { set_bit(fd, libc::c_ulong::from(code)) }.with_context(|| {
                        format!(
                            "set-bit ioctl failed for type {} code {}",
                            event_type.0, code
                        )
                    })?;
                }
            }
        }

        let mut setup = UinputSetup {
            id: libc::input_id {
                bustype: BUS_USB,
                vendor: 0,
                product: 0,
                version: 1,
            },
            name: [0; UINPUT_MAX_NAME_SIZE],
            ff_effects_max: 0,
        };
        for (dst, src) in setup
            .name
            .iter_mut()
            .zip(name.as_bytes().iter().take(UINPUT_MAX_NAME_SIZE - 1))
        {
            *dst = *src;
        }

        unsafe { ui_dev_setup(fd, &setup) }.context("UI_DEV_SETUP failed")?;
        unsafe { ui_dev_create(fd) }.context("UI_DEV_CREATE failed")?;

        tracing::info!("Created virtual device '{}'", name);

        Ok(Self { file })
    }
}

impl EventSink for VirtualDevice {
    /// Write one event record to the virtual device.
    fn emit(&self, event: &OutputEvent) -> io::Result<()> {
        // The kernel stamps the event time on injection.
        let raw = libc::input_event {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_: event.event_type,
            code: event.code,
            value: event.value,
        };
        let bytes = unsafe {
            std::slice::from_raw_parts(
                (&raw as *const libc::input_event).cast::<u8>(),
                std::mem::size_of::<libc::input_event>(),
            )
        };

        let written = nix::unistd::write(&self.file, bytes)?;
        if written != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write to virtual device",
            ));
        }
        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        // Tear the device node down before the fd closes.
        let _ = unsafe { ui_dev_destroy(self.file.as_raw_fd()) };
    }
}
