//! Protocol constants for the HP WMI firmware buffer interface
//!
//! Every hardware command travels as a little-endian binary buffer:
//! `[signature][command][commandtype][datasize][payload...]`, answered by
//! `[signature echo][status][payload...]`. The constants here name the
//! command classes, per-class command types, and status codes that the
//! firmware understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic signature ("SECU" as a little-endian word) leading every request.
pub const SIGNATURE: u32 = 0x5543_4553;

/// Hard cap on the declared input payload size.
pub const MAX_INSIZE: usize = 4096;

/// Requests carry at least this many payload bytes on the wire regardless
/// of the declared size; the remainder is zero-filled.
pub const MIN_INSIZE: usize = 128;

/// Size of the shared buffer used by the four-zone lighting commands.
pub const FOURZONE_BUFFER_SIZE: usize = 128;

/// Command classes (the `command` word of a request).
pub mod cmd {
    pub const READ: u32 = 0x01;
    pub const WRITE: u32 = 0x02;
    pub const ODM: u32 = 0x03;
    pub const GM: u32 = 0x2_0008;
    pub const FOURZONE: u32 = 0x2_0009;

    /// Human-readable name for a command class.
    pub fn name(command: u32) -> &'static str {
        match command {
            READ => "READ",
            WRITE => "WRITE",
            ODM => "ODM",
            GM => "GM",
            FOURZONE => "FOURZONE",
            _ => "UNKNOWN",
        }
    }
}

/// Command types used with the READ/WRITE command classes.
pub mod cmdtype {
    pub const DISPLAY: u32 = 0x01;
    pub const HDDTEMP: u32 = 0x02;
    pub const ALS: u32 = 0x03;
    pub const HARDWARE: u32 = 0x04;
    pub const WIRELESS: u32 = 0x05;
    pub const BATTERY: u32 = 0x07;
    pub const BIOS: u32 = 0x09;
    pub const FEATURE: u32 = 0x0b;
    pub const HOTKEY: u32 = 0x0c;
    pub const FEATURE2: u32 = 0x0d;
    pub const WIRELESS2: u32 = 0x1b;
    pub const POSTCODE: u32 = 0x2a;
    pub const SYSTEM_DEVICE_MODE: u32 = 0x40;
    pub const THERMAL_PROFILE: u32 = 0x4c;
}

/// Command types used with the GM command class (thermal and fan control).
pub mod gm {
    pub const FAN_COUNT_GET: u32 = 0x10;
    pub const FAN_SPEED_GET: u32 = 0x11;
    pub const SET_PERFORMANCE_MODE: u32 = 0x1A;
    pub const GPU_MODES_GET: u32 = 0x21;
    pub const GPU_MODES_SET: u32 = 0x22;
    pub const FAN_SPEED_MAX_GET: u32 = 0x26;
    pub const FAN_SPEED_MAX_SET: u32 = 0x27;
    pub const SYSTEM_DESIGN_DATA: u32 = 0x28;
    pub const SET_POWER_LIMITS: u32 = 0x29;
    pub const VICTUS_S_FAN_SPEED_GET: u32 = 0x2D;
    pub const FAN_SPEED_SET: u32 = 0x2E;
}

/// Command types used with the FOURZONE command class.
pub mod fourzone {
    pub const COLOR_GET: u32 = 2;
    pub const COLOR_SET: u32 = 3;
    pub const BRIGHTNESS_GET: u32 = 4;
    pub const BRIGHTNESS_SET: u32 = 5;
    pub const ANIM_GET: u32 = 6;
    pub const ANIM_SET: u32 = 7;
}

/// Firmware status codes (the `status` word of a response).
pub mod status {
    pub const SUCCESS: u32 = 0x00;
    pub const WRONG_SIGNATURE: u32 = 0x02;
    pub const UNKNOWN_COMMAND: u32 = 0x03;
    pub const UNKNOWN_CMDTYPE: u32 = 0x04;
    pub const INVALID_PARAMETERS: u32 = 0x05;

    /// Human-readable name for a status code.
    pub fn name(status: u32) -> &'static str {
        match status {
            SUCCESS => "success",
            WRONG_SIGNATURE => "wrong signature",
            UNKNOWN_COMMAND => "unknown command",
            UNKNOWN_CMDTYPE => "unknown command type",
            INVALID_PARAMETERS => "invalid parameters",
            _ => "unknown status",
        }
    }

    /// Statuses that mean "the firmware does not implement this" — expected
    /// outcomes when probing capability, never reportable errors.
    pub fn is_unsupported(status: u32) -> bool {
        matches!(status, UNKNOWN_COMMAND | UNKNOWN_CMDTYPE)
    }
}

/// Bit layout of the wireless query word and the indexed-table power flags.
pub mod wireless {
    use super::RadioKind;

    /// Present-radio bits of the legacy bitmask (bit per kind).
    pub const PRESENT_WIFI: u32 = 0x1;
    pub const PRESENT_BLUETOOTH: u32 = 0x2;
    pub const PRESENT_WWAN: u32 = 0x4;

    /// Software-block bit for a radio kind in the legacy wireless word.
    ///
    /// The software and hardware bits sit at different base offsets; the
    /// asymmetry is the firmware's, not ours.
    pub fn soft_block_mask(kind: RadioKind) -> u32 {
        0x200 << (kind as u32 * 8)
    }

    /// Hardware-block bit for a radio kind in the legacy wireless word.
    pub fn hard_block_mask(kind: RadioKind) -> u32 {
        0x800 << (kind as u32 * 8)
    }

    /// Power-flags bits of an indexed-table device record.
    pub const POWER_STATE: u8 = 0x01;
    pub const POWER_SOFT: u8 = 0x02;
    pub const POWER_BIOS: u8 = 0x04;
    pub const POWER_HARD: u8 = 0x08;

    /// Hardware-blocked unless both the BIOS and the hardware allow power.
    pub fn is_hw_blocked(power: u8) -> bool {
        power & (POWER_BIOS | POWER_HARD) != (POWER_BIOS | POWER_HARD)
    }

    /// Software-blocked when the soft-allowed bit is clear.
    pub fn is_sw_blocked(power: u8) -> bool {
        power & POWER_SOFT == 0
    }
}

/// Radio kinds as reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RadioKind {
    Wifi = 0x0,
    Bluetooth = 0x1,
    Wwan = 0x2,
    Gps = 0x3,
}

impl RadioKind {
    /// Kinds addressable through the legacy bitmask protocol.
    pub const LEGACY: [RadioKind; 3] = [RadioKind::Wifi, RadioKind::Bluetooth, RadioKind::Wwan];

    /// Convert from the wire byte of a device record.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Wifi),
            0x1 => Some(Self::Bluetooth),
            0x2 => Some(Self::Wwan),
            0x3 => Some(Self::Gps),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
            Self::Wwan => "wwan",
            Self::Gps => "gps",
        }
    }
}

impl fmt::Display for RadioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
