//! Thermal profile dispatch
//!
//! Four hardware families implement the same logical "set a cooling policy"
//! operation through different command protocols: the generic WMI thermal
//! query, the Omen embedded-controller profile (two numeric code
//! generations, some boards with an EC countdown timer), the Victus EC
//! profile, and the Victus-S EC profile combined with GPU power-limit
//! writes. The variant is resolved once from the board name and never
//! changes.
//!
//! The driver persists the *intended* profile ([`ThermalDispatcher::profile`])
//! under one mutex: hardware writes happen first, and the cached value is
//! updated only after they succeed, so the cache never diverges from a
//! known-applied state. Firmware silently resets the profile on AC power
//! transitions; [`ThermalDispatcher::power_source_changed`] re-applies the
//! intended profile when the fresh hardware state disagrees.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use hpwmi_transport::protocol::{cmd, cmdtype, gm};
use hpwmi_transport::BoxedEc;

use crate::error::PlatformError;
use crate::{fan, HpWmi, MachineInfo};

/// EC register holding the current thermal profile code.
const EC_PROFILE: u8 = 0x95;
/// EC register holding the profile flags (timer boards only).
const EC_PROFILE_FLAGS: u8 = 0x62;
/// EC register holding the profile countdown timer (timer boards only).
const EC_PROFILE_TIMER: u8 = 0x63;

/// EC flag: disable the profile countdown timer.
const EC_FLAG_NOTIMER: u8 = 0x02;
/// EC flag: turbo fan curve.
const EC_FLAG_TURBO: u8 = 0x04;

/// CPU power-limit value meaning "firmware default".
pub const POWER_LIMIT_DEFAULT: u8 = 0x00;
/// CPU power-limit field value meaning "leave unchanged".
pub const POWER_LIMIT_NO_CHANGE: u8 = 0xFF;

/// Boards using the Omen thermal profile protocol.
const OMEN_BOARDS: &[&str] = &[
    "84DA", "84DB", "84DC", "8574", "8575", "860A", "87B5", "8572", "8573",
    "8600", "8601", "8602", "8605", "8606", "8607", "8746", "8747", "8749",
    "874A", "8603", "8604", "8748", "886B", "886C", "878A", "878B", "878C",
    "88C8", "88CB", "8786", "8787", "8788", "88D1", "88D2", "88F4", "88FD",
    "88F5", "88F6", "88F7", "88FE", "88FF", "8900", "8901", "8902", "8912",
    "8917", "8918", "8949", "894A", "89EB", "8BAD", "8A42", "8A15",
];

/// Omen boards known to misreport the policy version; forced to v0.
const OMEN_FORCE_V0_BOARDS: &[&str] = &["8607", "8746", "8747", "8749", "874A", "8748"];

/// Omen boards with the EC profile countdown timer.
const OMEN_TIMED_BOARDS: &[&str] = &["8BAD", "8A42", "8A15"];

/// Boards using the Victus protocol.
const VICTUS_BOARDS: &[&str] = &["8A25"];

/// Boards using the Victus-S protocol.
const VICTUS_S_BOARDS: &[&str] = &["8C9C"];

pub fn is_omen_board(board: &str) -> bool {
    OMEN_BOARDS.contains(&board)
}

pub fn is_victus_board(board: &str) -> bool {
    VICTUS_BOARDS.contains(&board)
}

pub fn is_victus_s_board(board: &str) -> bool {
    VICTUS_S_BOARDS.contains(&board)
}

fn has_ec_timer(board: &str) -> bool {
    OMEN_TIMED_BOARDS.contains(&board)
}

/// The externally visible cooling policy vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformProfile {
    Performance,
    Balanced,
    Cool,
    Quiet,
    LowPower,
}

impl PlatformProfile {
    pub fn name(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Balanced => "balanced",
            Self::Cool => "cool",
            Self::Quiet => "quiet",
            Self::LowPower => "low-power",
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The per-hardware-family command protocol, resolved once from the board
/// name (and, within Omen, a firmware policy-version query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalVariant {
    Generic,
    OmenV0,
    OmenV1,
    Victus,
    VictusS,
}

impl ThermalVariant {
    /// Resolve the variant for this machine. Within Omen, boards on the
    /// force-v0 list skip the policy-version query.
    pub fn resolve(machine: &MachineInfo, wmi: &HpWmi) -> Result<Self, PlatformError> {
        let board = machine.board_name.as_str();
        if is_omen_board(board) {
            let version = if OMEN_FORCE_V0_BOARDS.contains(&board) {
                0
            } else {
                let data = wmi.perform_query(gm::SYSTEM_DESIGN_DATA, cmd::GM, &[0u8; 8], 8)?;
                data[3]
            };
            match version {
                0 => Ok(Self::OmenV0),
                1 => Ok(Self::OmenV1),
                other => Err(PlatformError::NotSupported(format!(
                    "unknown thermal policy version {other}"
                ))),
            }
        } else if is_victus_board(board) {
            Ok(Self::Victus)
        } else if is_victus_s_board(board) {
            Ok(Self::VictusS)
        } else {
            Ok(Self::Generic)
        }
    }

    /// Profiles this variant can apply.
    pub fn available_profiles(self) -> &'static [PlatformProfile] {
        use PlatformProfile::*;
        match self {
            Self::Generic => &[Cool, Quiet, Balanced, Performance],
            Self::OmenV0 | Self::OmenV1 => &[Cool, Balanced, Performance],
            Self::Victus => &[Quiet, Balanced, Performance],
            Self::VictusS => &[LowPower, Balanced, Performance],
        }
    }

    /// Map a profile to this variant's numeric code.
    fn profile_to_code(self, profile: PlatformProfile) -> Result<u8, PlatformError> {
        use PlatformProfile::*;
        let code = match (self, profile) {
            (Self::Generic, Performance) => 0x00,
            (Self::Generic, Balanced) => 0x01,
            (Self::Generic, Cool) => 0x02,
            (Self::Generic, Quiet) => 0x03,

            (Self::OmenV0, Balanced) => 0x00,
            (Self::OmenV0, Performance) => 0x01,
            (Self::OmenV0, Cool) => 0x02,

            (Self::OmenV1, Balanced) => 0x30,
            (Self::OmenV1, Performance) => 0x31,
            (Self::OmenV1, Cool) => 0x50,

            (Self::Victus, Balanced) => 0x00,
            (Self::Victus, Performance) => 0x01,
            (Self::Victus, Quiet) => 0x03,

            // Low-power shares the default code; the difference lives in
            // the GPU power-mode write.
            (Self::VictusS, Balanced) | (Self::VictusS, LowPower) => 0x00,
            (Self::VictusS, Performance) => 0x01,

            (variant, profile) => {
                return Err(PlatformError::NotSupported(format!(
                    "profile {profile} is not available on {variant:?}"
                )))
            }
        };
        Ok(code)
    }

    /// Map this variant's numeric code back to a profile. Unknown codes are
    /// a hard error, never a default.
    fn profile_from_code(self, code: u32) -> Result<PlatformProfile, PlatformError> {
        use PlatformProfile::*;
        let profile = match (self, code) {
            (Self::Generic, 0x00) => Performance,
            (Self::Generic, 0x01) => Balanced,
            (Self::Generic, 0x02) => Cool,
            (Self::Generic, 0x03) => Quiet,

            // The EC reports whichever code generation the firmware last
            // wrote; accept both.
            (Self::OmenV0 | Self::OmenV1, 0x00 | 0x30) => Balanced,
            (Self::OmenV0 | Self::OmenV1, 0x01 | 0x31) => Performance,
            (Self::OmenV0 | Self::OmenV1, 0x02 | 0x50) => Cool,

            (Self::Victus, 0x00) => Balanced,
            (Self::Victus, 0x01) => Performance,
            (Self::Victus, 0x03) => Quiet,

            (Self::VictusS, 0x00) => Balanced,
            (Self::VictusS, 0x01) => Performance,

            (variant, code) => {
                return Err(PlatformError::UnexpectedResponse(format!(
                    "unknown thermal profile code {code:#x} on {variant:?}"
                )))
            }
        };
        Ok(profile)
    }
}

/// GPU power mode register block (Victus-S).
///
/// Writes must carry the currently persisted slowdown temperature so the
/// field is never clobbered: the set path is a read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GpuPowerModes {
    pub ctgp_enable: u8,
    pub ppab_enable: u8,
    pub dstate: u8,
    pub gpu_slowdown_temp: u8,
}

/// CPU power-limit register block (Victus-S).
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct PowerLimits {
    pl1: u8,
    pl2: u8,
    pl4: u8,
    cpu_gpu_concurrent_limit: u8,
}

/// The thermal profile dispatcher for one resolved hardware variant.
pub struct ThermalDispatcher {
    wmi: Arc<HpWmi>,
    ec: BoxedEc,
    variant: ThermalVariant,
    ec_timer: bool,
    active: Mutex<PlatformProfile>,
}

impl ThermalDispatcher {
    /// Resolve the variant, read the hardware's current profile, and re-apply
    /// it so firmware and cache start in a known-applied state. Victus-S has
    /// no trustworthy initial read and starts at Balanced.
    pub fn setup(
        wmi: Arc<HpWmi>,
        ec: BoxedEc,
        machine: &MachineInfo,
    ) -> Result<Self, PlatformError> {
        let variant = ThermalVariant::resolve(machine, &wmi)?;
        let dispatcher = Self {
            wmi,
            ec,
            variant,
            ec_timer: has_ec_timer(&machine.board_name),
            active: Mutex::new(PlatformProfile::Balanced),
        };
        let initial = match variant {
            ThermalVariant::VictusS => PlatformProfile::Balanced,
            _ => dispatcher.hardware_profile()?,
        };
        dispatcher.apply(initial)?;
        *dispatcher.active.lock() = initial;
        info!("thermal profile handler registered ({variant:?}, initial {initial})");
        Ok(dispatcher)
    }

    pub fn variant(&self) -> ThermalVariant {
        self.variant
    }

    pub fn available_profiles(&self) -> &'static [PlatformProfile] {
        self.variant.available_profiles()
    }

    /// Fresh read of the hardware's actual profile, never the cache.
    pub fn hardware_profile(&self) -> Result<PlatformProfile, PlatformError> {
        let code = match self.variant {
            ThermalVariant::Generic => self.wmi.read_int(cmdtype::THERMAL_PROFILE)?,
            _ => u32::from(self.ec.read_byte(EC_PROFILE)?),
        };
        self.variant.profile_from_code(code)
    }

    /// The profile the driver considers authoritative: the last successfully
    /// applied value (hardware truth for the Generic variant, which has no
    /// EC-backed cache to diverge from).
    pub fn profile(&self) -> Result<PlatformProfile, PlatformError> {
        match self.variant {
            ThermalVariant::Generic => self.hardware_profile(),
            _ => Ok(*self.active.lock()),
        }
    }

    /// Apply a profile: write hardware first, commit the cached value only
    /// on success. On any hardware-write failure the cache is unchanged and
    /// the error propagates.
    pub fn set_profile(&self, profile: PlatformProfile) -> Result<(), PlatformError> {
        let mut active = self.active.lock();
        self.apply(profile)?;
        *active = profile;
        Ok(())
    }

    fn apply(&self, profile: PlatformProfile) -> Result<(), PlatformError> {
        let code = self.variant.profile_to_code(profile)?;
        match self.variant {
            ThermalVariant::Generic => self
                .wmi
                .write_query(cmdtype::THERMAL_PROFILE, &u32::from(code).to_le_bytes()),
            ThermalVariant::OmenV0 | ThermalVariant::OmenV1 => {
                self.write_performance_mode(code)?;
                if self.ec_timer {
                    self.ec.write_byte(EC_PROFILE_TIMER, 0)?;
                    let flags = if profile == PlatformProfile::Performance {
                        EC_FLAG_NOTIMER | EC_FLAG_TURBO
                    } else {
                        0
                    };
                    self.ec.write_byte(EC_PROFILE_FLAGS, flags)?;
                }
                Ok(())
            }
            ThermalVariant::Victus => self.write_performance_mode(code),
            ThermalVariant::VictusS => {
                let (ctgp, ppab) = match profile {
                    PlatformProfile::Performance => (true, true),
                    PlatformProfile::Balanced => (false, true),
                    // Only LowPower remains after profile_to_code
                    _ => (false, false),
                };
                if profile == PlatformProfile::Performance {
                    // Arms the firmware's user-defined fan table; the count
                    // itself is irrelevant here.
                    if let Err(e) = fan::read_fan_count(&self.wmi) {
                        debug!("fan-count trigger read failed: {e}");
                    }
                }
                self.write_performance_mode(code)?;
                self.set_gpu_power_modes(ctgp, ppab, 1)
            }
        }
    }

    /// The Omen-style profile write: reserved byte plus the numeric code.
    fn write_performance_mode(&self, code: u8) -> Result<(), PlatformError> {
        self.wmi
            .perform_query(gm::SET_PERFORMANCE_MODE, cmd::GM, &[0xFF, code], 0)?;
        Ok(())
    }

    /// Current GPU power mode block (Victus-S).
    pub fn gpu_power_modes(&self) -> Result<GpuPowerModes, PlatformError> {
        let raw = self
            .wmi
            .perform_query(gm::GPU_MODES_GET, cmd::GM, &[0u8; 4], 4)?;
        GpuPowerModes::read_from_bytes(&raw).map_err(|_| {
            PlatformError::UnexpectedResponse("GPU power mode block has unexpected size".into())
        })
    }

    fn set_gpu_power_modes(
        &self,
        ctgp: bool,
        ppab: bool,
        dstate: u8,
    ) -> Result<(), PlatformError> {
        // Re-read first so the persisted slowdown temperature is carried
        // through unchanged.
        let current = self.gpu_power_modes()?;
        let modes = GpuPowerModes {
            ctgp_enable: u8::from(ctgp),
            ppab_enable: u8::from(ppab),
            dstate,
            gpu_slowdown_temp: current.gpu_slowdown_temp,
        };
        self.wmi
            .perform_query(gm::GPU_MODES_SET, cmd::GM, modes.as_bytes(), 0)?;
        Ok(())
    }

    /// Write the CPU PL1/PL2 pair, leaving PL4 and the concurrent limit
    /// unchanged. `0xFF` inputs and inverted pairs are rejected up front.
    pub fn set_cpu_power_limits(&self, pl1: u8, pl2: u8) -> Result<(), PlatformError> {
        if pl1 == POWER_LIMIT_NO_CHANGE || pl2 == POWER_LIMIT_NO_CHANGE || pl2 < pl1 {
            return Err(PlatformError::InvalidParameter(format!(
                "bad CPU power limits pl1={pl1} pl2={pl2}"
            )));
        }
        let limits = PowerLimits {
            pl1,
            pl2,
            pl4: POWER_LIMIT_NO_CHANGE,
            cpu_gpu_concurrent_limit: POWER_LIMIT_NO_CHANGE,
        };
        self.wmi
            .perform_query(gm::SET_POWER_LIMITS, cmd::GM, limits.as_bytes(), 0)?;
        Ok(())
    }

    /// Power-source hook. On Omen/Victus: when running on external power and
    /// the hardware's actual profile (fresh read) disagrees with the intended
    /// one, re-apply the intended profile — firmware silently resets it on
    /// power transitions. Victus-S instead re-applies only the default CPU
    /// power-limit pair while Performance is intended.
    pub fn power_source_changed(&self, on_external_power: bool) -> Result<(), PlatformError> {
        match self.variant {
            ThermalVariant::Generic => Ok(()),
            ThermalVariant::VictusS => {
                if *self.active.lock() == PlatformProfile::Performance {
                    debug!("re-applying default CPU power limits");
                    self.set_cpu_power_limits(POWER_LIMIT_DEFAULT, POWER_LIMIT_DEFAULT)?;
                }
                Ok(())
            }
            _ => {
                let active = self.active.lock();
                let actual = self.hardware_profile()?;
                if !on_external_power || actual == *active {
                    debug!("profile reconciliation skipped");
                    return Ok(());
                }
                debug!("restoring thermal profile {} after power change", *active);
                self.apply(*active)
            }
        }
    }
}
