//! Decoding of asynchronous firmware notifications
//!
//! The firmware pushes notification buffers of exactly 8 or 16 bytes. Both
//! shapes open with the event id word; the event data word sits second in
//! the short form and third in the long form. Anything else is malformed
//! and must be dropped by the dispatcher without touching driver state.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Closed set of hardware event ids.
///
/// Matching stays exhaustive while unknown ids remain representable (and
/// non-fatal) through [`EventId::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventId {
    Dock,
    ParkHdd,
    SmartAdapter,
    BezelButton,
    Wireless,
    CpuBatteryThrottle,
    LockSwitch,
    LidSwitch,
    ScreenRotation,
    CoolsenseMobile,
    CoolsenseHot,
    ProximitySensor,
    KeyboardBacklight,
    PeakshiftPeriod,
    BatteryChargePeriod,
    Sanitization,
    CameraToggle,
    OmenKey,
    SmartExperienceApp,
    Unknown(u32),
}

impl EventId {
    pub fn from_wire(id: u32) -> Self {
        match id {
            0x01 => Self::Dock,
            0x02 => Self::ParkHdd,
            0x03 => Self::SmartAdapter,
            0x04 => Self::BezelButton,
            0x05 => Self::Wireless,
            0x06 => Self::CpuBatteryThrottle,
            0x07 => Self::LockSwitch,
            0x08 => Self::LidSwitch,
            0x09 => Self::ScreenRotation,
            0x0A => Self::CoolsenseMobile,
            0x0B => Self::CoolsenseHot,
            0x0C => Self::ProximitySensor,
            0x0D => Self::KeyboardBacklight,
            0x0F => Self::PeakshiftPeriod,
            0x10 => Self::BatteryChargePeriod,
            0x17 => Self::Sanitization,
            0x1A => Self::CameraToggle,
            0x1D => Self::OmenKey,
            0x21 => Self::SmartExperienceApp,
            other => Self::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dock => "dock",
            Self::ParkHdd => "park hdd",
            Self::SmartAdapter => "smart adapter",
            Self::BezelButton => "bezel button",
            Self::Wireless => "wireless",
            Self::CpuBatteryThrottle => "cpu battery throttle",
            Self::LockSwitch => "lock switch",
            Self::LidSwitch => "lid switch",
            Self::ScreenRotation => "screen rotation",
            Self::CoolsenseMobile => "coolsense mobile",
            Self::CoolsenseHot => "coolsense hot",
            Self::ProximitySensor => "proximity sensor",
            Self::KeyboardBacklight => "keyboard backlight",
            Self::PeakshiftPeriod => "peakshift period",
            Self::BatteryChargePeriod => "battery charge period",
            Self::Sanitization => "sanitization mode",
            Self::CameraToggle => "camera toggle",
            Self::OmenKey => "omen key",
            Self::SmartExperienceApp => "smart experience app",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// One decoded notification: event id plus the event data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EventId,
    pub data: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification buffer has unsupported length {0} (expected 8 or 16)")]
    BadLength(usize),
}

/// Decode a raw notification buffer by its length.
pub fn parse_notification(buffer: &[u8]) -> Result<Notification, NotificationError> {
    let word = |index: usize| {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buffer[index * 4..index * 4 + 4]);
        u32::from_le_bytes(bytes)
    };
    let (id, data) = match buffer.len() {
        8 => (word(0), word(1)),
        16 => (word(0), word(2)),
        other => return Err(NotificationError::BadLength(other)),
    };
    let id = EventId::from_wire(id);
    trace!("notification {} (data {data:#x})", id.name());
    Ok(Notification { id, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn parse_short_form() {
        let buf = words(&[0x04, 0x1234]);
        let n = parse_notification(&buf).unwrap();
        assert_eq!(n.id, EventId::BezelButton);
        assert_eq!(n.data, 0x1234);
    }

    #[test]
    fn parse_long_form_takes_third_word() {
        let buf = words(&[0x1D, 0xAAAA_AAAA, 0x21A5, 0xBBBB_BBBB]);
        let n = parse_notification(&buf).unwrap();
        assert_eq!(n.id, EventId::OmenKey);
        assert_eq!(n.data, 0x21A5);
    }

    #[test]
    fn parse_rejects_other_lengths() {
        for len in [0usize, 4, 7, 9, 12, 15, 17, 32] {
            let buf = vec![0u8; len];
            assert_eq!(
                parse_notification(&buf),
                Err(NotificationError::BadLength(len))
            );
        }
    }

    #[test]
    fn unknown_id_is_preserved() {
        let buf = words(&[0x7F, 1]);
        let n = parse_notification(&buf).unwrap();
        assert_eq!(n.id, EventId::Unknown(0x7F));
    }

    #[test]
    fn notification_serializes() {
        let n = Notification {
            id: EventId::CameraToggle,
            data: 0xFF,
        };
        let json = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
