//! Driver core for HP laptop platform hardware
//!
//! Everything the hardware offers is reached through one narrow firmware
//! call (see [`hpwmi_transport::WmiTransport`]) plus raw embedded-controller
//! register access. This crate builds the driver proper on top of that:
//!
//! - [`HpWmi`]: the typed query engine over the binary command protocol
//! - [`rfkill`]: radio-block state synchronization across two firmware
//!   enumeration generations
//! - [`fourzone`]: four-zone RGB keyboard lighting
//! - [`thermal`]: thermal-profile dispatch across hardware variants, with
//!   power-source reconciliation
//! - [`fan`]: fan speed queries and forced-maximum control
//! - [`event`]: routing of asynchronous hardware notifications
//!
//! Device registration, sysfs plumbing and the notification delivery
//! mechanism belong to the embedder; it feeds raw notification buffers to
//! [`Driver::notify`] and AC-adapter transitions to
//! [`Driver::power_source_changed`].

pub mod error;
pub mod event;
pub mod fan;
pub mod fourzone;
pub mod keymap;
pub mod rfkill;
pub mod thermal;

pub use error::{FirmwareStatus, PlatformError};
pub use event::{EventDispatcher, EventSink, SwitchEndpoint};
pub use fan::{FanControl, FanMode};
pub use fourzone::{FourZone, ZoneColor};
pub use keymap::{KeyAction, KeymapEntry};
pub use rfkill::{RadioBlock, RadioEntry, RadioState};
pub use thermal::{PlatformProfile, ThermalDispatcher, ThermalVariant};

// Re-exported so embedders only need this crate to implement the seams.
pub use hpwmi_transport::{
    BoxedEc, BoxedTransport, EmbeddedController, EventId, Notification, OutputClass, RadioKind,
    TransportError, WmiTransport,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hpwmi_transport::command::{encode_request, Response};
use hpwmi_transport::protocol::{cmd, cmdtype, status};

/// SMBIOS chassis types that can report tablet mode.
const TABLET_CHASSIS_TYPES: &[&str] = &["30", "31", "32"];

/// System-device-mode value meaning "tablet".
const DEVICE_MODE_TABLET: u8 = 0x06;

/// Dock bit of the hardware query word.
const HARDWARE_DOCK_MASK: u32 = 0x01;

/// Value written via the BIOS query to enable hotkey reporting on 2008-era
/// firmware.
const HOTKEY_ENABLE: u32 = 0x6E;

/// Machine identity, as read from DMI by the embedder.
///
/// Consumed as plain configuration: the board name selects the thermal
/// variant and the chassis type gates tablet-mode reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub board_name: String,
    pub chassis_type: Option<String>,
}

impl MachineInfo {
    pub fn new(board_name: impl Into<String>) -> Self {
        Self {
            board_name: board_name.into(),
            chassis_type: None,
        }
    }

    pub fn with_chassis_type(mut self, chassis_type: impl Into<String>) -> Self {
        self.chassis_type = Some(chassis_type.into());
        self
    }
}

/// Typed query engine over the firmware buffer protocol.
///
/// Owns the uniform error mapping (unsupported statuses are expected probe
/// outcomes and are not logged as errors), the default buffer sizing, and
/// the zero-input-size convention some firmware generations require for
/// read queries.
pub struct HpWmi {
    transport: BoxedTransport,
    zero_insize: bool,
}

impl HpWmi {
    /// Wrap a transport and probe the zero-input-size convention: firmware
    /// that wants a declared input size of 0 for reads answers a 4-byte-input
    /// hardware query with "invalid parameters".
    pub fn new(transport: BoxedTransport) -> Self {
        let mut wmi = Self {
            transport,
            zero_insize: false,
        };
        wmi.zero_insize = matches!(
            wmi.perform_query(cmdtype::HARDWARE, cmd::READ, &[0u8; 4], 4),
            Err(PlatformError::Firmware(s)) if s.is_invalid_parameters()
        );
        debug!(
            "firmware input-size convention probed (zero insize: {})",
            wmi.zero_insize
        );
        wmi
    }

    pub fn zero_insize_support(&self) -> bool {
        self.zero_insize
    }

    /// One firmware call: encode, evaluate, decode.
    ///
    /// Returns the output payload (truncated or zero-filled to `outsize`) on
    /// status 0. A nonzero status becomes [`PlatformError::Firmware`];
    /// statuses other than the expected "unsupported" pair are logged.
    pub fn perform_query(
        &self,
        commandtype: u32,
        command: u32,
        input: &[u8],
        outsize: usize,
    ) -> Result<Vec<u8>, PlatformError> {
        let class = OutputClass::for_size(outsize)?;
        let request = encode_request(command, commandtype, input)?;
        let raw = self.transport.evaluate(class, &request)?;
        let response = Response::parse(&raw)?;
        if !response.is_success() {
            let fw = FirmwareStatus(response.status);
            if !fw.is_unsupported() {
                warn!("query {commandtype:#x} cmd {command:#x}: firmware error {fw}");
            }
            return Err(PlatformError::Firmware(fw));
        }
        Ok(response.read_output(outsize))
    }

    /// Read query: declared input size is 0 when the firmware supports it,
    /// else a zeroed buffer of the output size.
    pub fn read_query(
        &self,
        commandtype: u32,
        command: u32,
        outsize: usize,
    ) -> Result<Vec<u8>, PlatformError> {
        if self.zero_insize {
            self.perform_query(commandtype, command, &[], outsize)
        } else {
            let zeroes = vec![0u8; outsize];
            self.perform_query(commandtype, command, &zeroes, outsize)
        }
    }

    /// Write query: payload in, no output.
    pub fn write_query(&self, commandtype: u32, input: &[u8]) -> Result<(), PlatformError> {
        self.perform_query(commandtype, cmd::WRITE, input, 0)?;
        Ok(())
    }

    /// The common 4-byte read. Any nonzero status maps to a generic
    /// invalid-result error; transport failures propagate unchanged.
    pub fn read_int(&self, commandtype: u32) -> Result<u32, PlatformError> {
        let out = match self.read_query(commandtype, cmd::READ, 4) {
            Ok(out) => out,
            Err(PlatformError::Firmware(fw)) => {
                return Err(PlatformError::UnexpectedResponse(format!(
                    "query {commandtype:#x} failed with status {fw}"
                )))
            }
            Err(e) => return Err(e),
        };
        let mut word = [0u8; 4];
        word.copy_from_slice(&out[..4]);
        Ok(u32::from_le_bytes(word))
    }

    // === Device state queries ===

    /// Whether the machine sits in a dock.
    pub fn dock_state(&self) -> Result<bool, PlatformError> {
        Ok(self.read_int(cmdtype::HARDWARE)? & HARDWARE_DOCK_MASK != 0)
    }

    /// Tablet mode, or `None` when the chassis cannot report it.
    pub fn tablet_mode(&self, machine: &MachineInfo) -> Result<Option<bool>, PlatformError> {
        let Some(chassis) = machine.chassis_type.as_deref() else {
            return Ok(None);
        };
        if !TABLET_CHASSIS_TYPES.contains(&chassis) {
            return Ok(None);
        }
        let mode = self.read_query(cmdtype::SYSTEM_DEVICE_MODE, cmd::READ, 4)?;
        Ok(Some(mode[0] == DEVICE_MODE_TABLET))
    }

    pub fn display_state(&self) -> Result<u32, PlatformError> {
        self.read_int(cmdtype::DISPLAY)
    }

    pub fn hdd_temperature(&self) -> Result<u32, PlatformError> {
        self.read_int(cmdtype::HDDTEMP)
    }

    pub fn ambient_light_level(&self) -> Result<u32, PlatformError> {
        self.read_int(cmdtype::ALS)
    }

    pub fn set_ambient_light_level(&self, value: u32) -> Result<(), PlatformError> {
        self.write_query(cmdtype::ALS, &value.to_le_bytes())
    }

    /// POST error code left by the last boot.
    pub fn postcode(&self) -> Result<u32, PlatformError> {
        self.read_int(cmdtype::POSTCODE)
    }

    pub fn clear_postcode(&self) -> Result<(), PlatformError> {
        self.write_query(cmdtype::POSTCODE, &1u32.to_le_bytes())
    }

    /// Drain the hotkey buffer: the scancode of the most recent hotkey.
    pub fn hotkey_code(&self) -> Result<u32, PlatformError> {
        self.read_int(cmdtype::HOTKEY)
    }

    // === Firmware generation probes ===

    /// 2008-or-later firmware answers the feature query; older firmware
    /// reports unknown command type.
    pub fn bios_2008_later(&self) -> Result<bool, PlatformError> {
        match self.read_query(cmdtype::FEATURE, cmd::READ, 4) {
            Ok(_) => Ok(true),
            Err(PlatformError::Firmware(fw)) if fw.0 == status::UNKNOWN_CMDTYPE => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 2009-or-later firmware answers the feature2 query.
    pub fn bios_2009_later(&self) -> Result<bool, PlatformError> {
        match self.read_query(cmdtype::FEATURE2, cmd::READ, 128) {
            Ok(_) => Ok(true),
            Err(PlatformError::Firmware(fw)) if fw.0 == status::UNKNOWN_CMDTYPE => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Enable hotkey reporting on 2008-era firmware.
    pub fn enable_hotkeys(&self) -> Result<(), PlatformError> {
        self.write_query(cmdtype::BIOS, &HOTKEY_ENABLE.to_le_bytes())
    }
}

/// The assembled driver: all subsystems wired to one transport.
pub struct Driver {
    wmi: Arc<HpWmi>,
    radios: Arc<RadioBlock>,
    fourzone: Option<FourZone>,
    thermal: Option<Arc<ThermalDispatcher>>,
    fans: FanControl,
    dispatcher: EventDispatcher,
    machine: MachineInfo,
}

impl Driver {
    /// Probe and wire the subsystems in the hardware's setup order.
    ///
    /// Absent features (no radios, no four-zone lighting, no thermal
    /// handler) disable their subsystem without failing setup.
    pub fn setup(
        transport: BoxedTransport,
        ec: BoxedEc,
        machine: MachineInfo,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let wmi = Arc::new(HpWmi::new(transport));

        let radios = Arc::new(RadioBlock::setup(Arc::clone(&wmi)));
        let fourzone = FourZone::probe(Arc::clone(&wmi));
        let thermal = match ThermalDispatcher::setup(Arc::clone(&wmi), ec, &machine) {
            Ok(dispatcher) => Some(Arc::new(dispatcher)),
            Err(e) => {
                warn!("thermal profile setup failed: {e}");
                None
            }
        };
        let fans = FanControl::new(
            Arc::clone(&wmi),
            thermal::is_victus_s_board(&machine.board_name),
        );
        let dispatcher = EventDispatcher::new(
            Arc::clone(&wmi),
            Arc::clone(&radios),
            machine.clone(),
            sink,
        );

        Self {
            wmi,
            radios,
            fourzone,
            thermal,
            fans,
            dispatcher,
            machine,
        }
    }

    /// Feed one raw notification buffer from the firmware's event channel.
    pub fn notify(&self, buffer: &[u8]) {
        self.dispatcher.handle(buffer);
    }

    /// AC-adapter state change: hand the power-source hook to the thermal
    /// dispatcher so profiles the firmware silently reset get re-applied.
    pub fn power_source_changed(&self, on_external_power: bool) {
        if let Some(thermal) = &self.thermal {
            if let Err(e) = thermal.power_source_changed(on_external_power) {
                warn!("profile reconciliation failed: {e}");
            }
        }
    }

    /// Resume from suspend: cached radio state is stale, re-synchronize.
    pub fn resume(&self) {
        if let Err(e) = self.radios.refresh() {
            warn!("radio state refresh on resume failed: {e}");
        }
        if let Ok(docked) = self.wmi.dock_state() {
            self.dispatcher.sink().dock_changed(docked);
        }
        if let Ok(Some(tablet)) = self.wmi.tablet_mode(&self.machine) {
            self.dispatcher.sink().tablet_mode_changed(tablet);
        }
    }

    pub fn wmi(&self) -> &Arc<HpWmi> {
        &self.wmi
    }

    pub fn radios(&self) -> &RadioBlock {
        &self.radios
    }

    pub fn fourzone(&self) -> Option<&FourZone> {
        self.fourzone.as_ref()
    }

    pub fn thermal(&self) -> Option<&Arc<ThermalDispatcher>> {
        self.thermal.as_ref()
    }

    pub fn fans(&self) -> &FanControl {
        &self.fans
    }

    pub fn machine(&self) -> &MachineInfo {
        &self.machine
    }
}
