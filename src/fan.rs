//! Fan speed queries and forced-maximum control
//!
//! The firmware knows exactly two fan policies: automatic (its own curve)
//! and forced maximum. There is no manual duty-cycle state. Victus-S boards
//! answer a different speed query and want the fan-count trigger read before
//! any fan write.

use std::sync::Arc;

use tracing::debug;

use hpwmi_transport::protocol::{cmd, gm};

use crate::error::PlatformError;
use crate::HpWmi;

/// Fan speed byte meaning "automatic".
const FAN_SPEED_AUTOMATIC: u8 = 0x00;

/// External fan policy vocabulary. On the wire this is the pwm-enable
/// convention: 2 = automatic, 0 = forced maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Automatic,
    Maximum,
}

impl FanMode {
    /// The pwm-enable value exposed for this mode.
    pub fn pwm_enable(self) -> u8 {
        match self {
            Self::Automatic => 2,
            Self::Maximum => 0,
        }
    }

    /// Parse the pwm-enable convention. Only 2 and 0 exist; the firmware
    /// has no third state.
    pub fn from_pwm_enable(value: u8) -> Option<Self> {
        match value {
            2 => Some(Self::Automatic),
            0 => Some(Self::Maximum),
            _ => None,
        }
    }
}

/// Read the fan count. Doubles as the firmware's user-defined-table trigger;
/// some write paths issue it purely for that side effect.
pub fn read_fan_count(wmi: &HpWmi) -> Result<u8, PlatformError> {
    let out = wmi.perform_query(gm::FAN_COUNT_GET, cmd::GM, &[0u8], 4)?;
    Ok(out[0])
}

/// Fan control over the GM command class.
pub struct FanControl {
    wmi: Arc<HpWmi>,
    victus_s: bool,
}

impl FanControl {
    pub fn new(wmi: Arc<HpWmi>, victus_s: bool) -> Self {
        Self { wmi, victus_s }
    }

    pub fn fan_count(&self) -> Result<u8, PlatformError> {
        read_fan_count(&self.wmi)
    }

    /// Current speed of one fan in RPM.
    pub fn fan_speed(&self, fan: u8) -> Result<u32, PlatformError> {
        if self.victus_s {
            if usize::from(fan) >= 128 {
                return Err(PlatformError::InvalidParameter(format!(
                    "fan index {fan} out of range"
                )));
            }
            let out = self
                .wmi
                .perform_query(gm::VICTUS_S_FAN_SPEED_GET, cmd::GM, &[fan], 128)?;
            Ok(u32::from(out[usize::from(fan)]) * 100)
        } else {
            let out = self
                .wmi
                .perform_query(gm::FAN_SPEED_GET, cmd::GM, &[fan], 4)?;
            Ok((u32::from(out[2]) << 8) | u32::from(out[3]))
        }
    }

    /// Current fan policy, from the forced-maximum flag.
    pub fn fan_mode(&self) -> Result<FanMode, PlatformError> {
        let out = self
            .wmi
            .read_query(gm::FAN_SPEED_MAX_GET, cmd::GM, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&out[..4]);
        match u32::from_le_bytes(word) {
            0 => Ok(FanMode::Automatic),
            1 => Ok(FanMode::Maximum),
            other => Err(PlatformError::UnexpectedResponse(format!(
                "unknown forced-maximum flag {other}"
            ))),
        }
    }

    /// Switch between automatic and forced-maximum.
    pub fn set_fan_mode(&self, mode: FanMode) -> Result<(), PlatformError> {
        if self.victus_s {
            if let Err(e) = read_fan_count(&self.wmi) {
                debug!("fan-count trigger read failed: {e}");
            }
        }
        match mode {
            FanMode::Maximum => self.set_max_fan(true),
            FanMode::Automatic if self.victus_s => self.reset_max_fan(),
            FanMode::Automatic => self.set_max_fan(false),
        }
    }

    fn set_max_fan(&self, enabled: bool) -> Result<(), PlatformError> {
        self.wmi.perform_query(
            gm::FAN_SPEED_MAX_SET,
            cmd::GM,
            &u32::from(enabled).to_le_bytes(),
            0,
        )?;
        Ok(())
    }

    /// Full return to automatic: drop the maximum flag, then hand both fans
    /// back to the firmware's curve.
    fn reset_max_fan(&self) -> Result<(), PlatformError> {
        self.set_max_fan(false)?;
        self.wmi.perform_query(
            gm::FAN_SPEED_SET,
            cmd::GM,
            &[FAN_SPEED_AUTOMATIC, FAN_SPEED_AUTOMATIC],
            0,
        )?;
        Ok(())
    }
}
