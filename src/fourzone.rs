//! Four-zone RGB keyboard lighting
//!
//! All four zones live inside one shared 128-byte firmware buffer, each as a
//! 3-byte BGR window. Because the buffer is shared, every zone write must
//! re-read the whole buffer, patch its own 3 bytes, and write the whole
//! buffer back; a zone's state is only valid immediately after a full read.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use hpwmi_transport::protocol::{cmd, fourzone, FOURZONE_BUFFER_SIZE};

use crate::error::PlatformError;
use crate::HpWmi;

/// Number of lighting zones.
pub const ZONE_COUNT: usize = 4;

/// Byte offset of zone 0 inside the shared buffer; zone `i` follows at
/// `ZONE_BASE + 3 * i`.
const ZONE_BASE: usize = 25;

/// One zone's color. External representation is a 6-hex-digit "RRGGBB"
/// string; the wire stores BGR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ZoneColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for ZoneColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for ZoneColor {
    type Err = PlatformError;

    /// Parse a strict 6-hex-digit "RRGGBB" string. Rejected before any
    /// firmware interaction.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PlatformError::InvalidParameter(format!(
                "color must be 6 hex digits (RRGGBB), got \"{s}\""
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            // Hex digits were validated above
            u8::from_str_radix(&s[range], 16).unwrap_or(0)
        };
        Ok(Self {
            r: channel(0..2),
            g: channel(2..4),
            b: channel(4..6),
        })
    }
}

/// The four-zone lighting subsystem, present only when the probe succeeds.
pub struct FourZone {
    wmi: Arc<HpWmi>,
}

impl FourZone {
    /// Probe for four-zone support with a color read. Unsupported firmware
    /// disables the subsystem silently; any other failure disables it with a
    /// warning. Neither fails driver setup.
    pub fn probe(wmi: Arc<HpWmi>) -> Option<Self> {
        match wmi.perform_query(fourzone::COLOR_GET, cmd::FOURZONE, &[], FOURZONE_BUFFER_SIZE) {
            Ok(_) => {
                info!("four-zone keyboard lighting detected");
                Some(Self { wmi })
            }
            Err(e) if e.is_unsupported() => {
                info!("four-zone keyboard lighting not supported by this firmware");
                None
            }
            Err(e) => {
                warn!("four-zone lighting probe failed, not enabling: {e}");
                None
            }
        }
    }

    fn check_zone(zone: usize) -> Result<(), PlatformError> {
        if zone >= ZONE_COUNT {
            return Err(PlatformError::InvalidParameter(format!(
                "zone {zone} out of range (0-{})",
                ZONE_COUNT - 1
            )));
        }
        Ok(())
    }

    fn read_buffer(&self) -> Result<Vec<u8>, PlatformError> {
        self.wmi
            .perform_query(fourzone::COLOR_GET, cmd::FOURZONE, &[], FOURZONE_BUFFER_SIZE)
    }

    fn offset(zone: usize) -> usize {
        ZONE_BASE + zone * 3
    }

    /// Read one zone's color from a fresh full-buffer read.
    pub fn zone_color(&self, zone: usize) -> Result<ZoneColor, PlatformError> {
        Self::check_zone(zone)?;
        let buffer = self.read_buffer()?;
        let offset = Self::offset(zone);
        Ok(ZoneColor {
            b: buffer[offset],
            g: buffer[offset + 1],
            r: buffer[offset + 2],
        })
    }

    /// Read all four zones from one full-buffer read.
    pub fn all_zones(&self) -> Result<[ZoneColor; ZONE_COUNT], PlatformError> {
        let buffer = self.read_buffer()?;
        let mut zones = [ZoneColor::default(); ZONE_COUNT];
        for (zone, color) in zones.iter_mut().enumerate() {
            let offset = Self::offset(zone);
            *color = ZoneColor {
                b: buffer[offset],
                g: buffer[offset + 1],
                r: buffer[offset + 2],
            };
        }
        Ok(zones)
    }

    /// Set one zone's color: full read, patch the zone's 3 bytes, full write.
    /// The other three zones are carried through unchanged.
    pub fn set_zone_color(&self, zone: usize, color: ZoneColor) -> Result<(), PlatformError> {
        Self::check_zone(zone)?;
        let mut buffer = self.read_buffer()?;
        let offset = Self::offset(zone);
        buffer[offset] = color.b;
        buffer[offset + 1] = color.g;
        buffer[offset + 2] = color.r;
        self.wmi
            .perform_query(fourzone::COLOR_SET, cmd::FOURZONE, &buffer, 0)?;
        Ok(())
    }
}
