//! In-memory fake firmware for driver tests.
//!
//! Implements both capability traits over a scripted state block so the full
//! driver can be exercised without hardware: queries decode the real wire
//! format, answer from the state, and log every request for assertions.

// Each test binary uses its own slice of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use hpwmi_platform::{EmbeddedController, EventSink, KeyAction, OutputClass, SwitchEndpoint};
use hpwmi_platform::{PlatformError, TransportError, WmiTransport};
use hpwmi_transport::protocol::{cmd, cmdtype, fourzone, gm, status, SIGNATURE};

/// One decoded request, as logged by the fake.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: u32,
    pub commandtype: u32,
    pub datasize: u32,
    pub payload: Vec<u8>,
    pub class: OutputClass,
}

#[derive(Debug)]
pub struct FirmwareState {
    /// Firmware demands a declared input size of 0 on reads.
    pub zero_insize: bool,
    /// Answer to the feature2 probe (true = 2009-or-later firmware).
    pub feature2: bool,
    pub hardware_word: u32,
    pub device_mode: u8,
    pub hotkey_code: u32,
    pub display_state: u32,
    pub hdd_temp: u32,
    pub als: u32,
    pub postcode: u32,
    /// Legacy wireless word; `None` answers "unknown command type".
    pub wireless_word: Option<u32>,
    /// Indexed radio table (128 bytes); `None` answers "unknown command type".
    pub rfkill2: Option<Vec<u8>>,
    /// Four-zone color buffer; `None` answers "unknown command".
    pub fourzone: Option<[u8; 128]>,
    /// Generic thermal profile code; `None` answers "unknown command type".
    pub thermal_code: Option<u32>,
    /// System design data block; `None` answers "unknown command type".
    pub design_data: Option<[u8; 8]>,
    /// GPU power mode block; `None` answers "unknown command type".
    pub gpu_modes: Option<[u8; 4]>,
    pub fan_count: u8,
    pub fan_speed_raw: (u8, u8),
    pub victus_fan_speeds: [u8; 128],
    pub max_fan: u32,
    /// Inject a failure into the performance-mode write.
    pub fail_performance_mode: bool,
    pub ec: [u8; 256],
    pub ec_writes: Vec<(u8, u8)>,
    pub requests: Vec<Request>,
}

impl Default for FirmwareState {
    fn default() -> Self {
        Self {
            zero_insize: false,
            feature2: false,
            hardware_word: 0,
            device_mode: 0,
            hotkey_code: 0,
            display_state: 0,
            hdd_temp: 0,
            als: 0,
            postcode: 0,
            wireless_word: None,
            rfkill2: None,
            fourzone: None,
            thermal_code: None,
            design_data: None,
            gpu_modes: None,
            fan_count: 2,
            fan_speed_raw: (0, 0),
            victus_fan_speeds: [0; 128],
            max_fan: 0,
            fail_performance_mode: false,
            ec: [0; 256],
            ec_writes: Vec::new(),
            requests: Vec::new(),
        }
    }
}

pub struct FakeFirmware {
    pub state: Mutex<FirmwareState>,
}

impl FakeFirmware {
    pub fn new(state: FirmwareState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    /// Requests logged for a given command/commandtype pair.
    pub fn requests_for(&self, command: u32, commandtype: u32) -> Vec<Request> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.command == command && r.commandtype == commandtype)
            .cloned()
            .collect()
    }
}

fn respond(status: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&SIGNATURE.to_le_bytes());
    out.extend_from_slice(&status.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

impl WmiTransport for FakeFirmware {
    fn evaluate(&self, class: OutputClass, input: &[u8]) -> Result<Vec<u8>, TransportError> {
        assert!(input.len() >= 16, "request shorter than its header");
        let word = |at: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&input[at..at + 4]);
            u32::from_le_bytes(bytes)
        };
        assert_eq!(word(0), SIGNATURE, "request signature mismatch");
        let command = word(4);
        let commandtype = word(8);
        let datasize = word(12);
        let payload = input[16..16 + (datasize as usize).min(input.len() - 16)].to_vec();

        let mut state = self.state.lock();
        state.requests.push(Request {
            command,
            commandtype,
            datasize,
            payload: payload.clone(),
            class,
        });

        // Firmware generations that take zero-size read inputs reject
        // anything else as invalid parameters.
        if state.zero_insize && command == cmd::READ && datasize != 0 {
            return Ok(respond(status::INVALID_PARAMETERS, &[]));
        }

        let reply = match (command, commandtype) {
            (cmd::READ, cmdtype::HARDWARE) => respond(0, &state.hardware_word.to_le_bytes()),
            (cmd::READ, cmdtype::SYSTEM_DEVICE_MODE) => {
                respond(0, &[state.device_mode, 0, 0, 0])
            }
            (cmd::READ, cmdtype::HOTKEY) => respond(0, &state.hotkey_code.to_le_bytes()),
            (cmd::READ, cmdtype::DISPLAY) => respond(0, &state.display_state.to_le_bytes()),
            (cmd::READ, cmdtype::HDDTEMP) => respond(0, &state.hdd_temp.to_le_bytes()),
            (cmd::READ, cmdtype::ALS) => respond(0, &state.als.to_le_bytes()),
            (cmd::WRITE, cmdtype::ALS) => {
                let mut bytes = [0u8; 4];
                bytes[..payload.len().min(4)].copy_from_slice(&payload[..payload.len().min(4)]);
                state.als = u32::from_le_bytes(bytes);
                respond(0, &[])
            }
            (cmd::READ, cmdtype::POSTCODE) => respond(0, &state.postcode.to_le_bytes()),
            (cmd::WRITE, cmdtype::POSTCODE) => {
                state.postcode = 0;
                respond(0, &[])
            }
            (cmd::READ, cmdtype::FEATURE) => respond(0, &[0; 4]),
            (cmd::READ, cmdtype::FEATURE2) => {
                if state.feature2 {
                    respond(0, &[0; 128])
                } else {
                    respond(status::UNKNOWN_CMDTYPE, &[])
                }
            }
            (cmd::READ, cmdtype::WIRELESS) => match state.wireless_word {
                Some(word) => respond(0, &word.to_le_bytes()),
                None => respond(status::UNKNOWN_CMDTYPE, &[]),
            },
            (cmd::WRITE, cmdtype::WIRELESS) => respond(0, &[]),
            (cmd::READ, cmdtype::WIRELESS2) => match &state.rfkill2 {
                Some(table) => respond(0, table),
                None => respond(status::UNKNOWN_CMDTYPE, &[]),
            },
            (cmd::WRITE, cmdtype::WIRELESS2) => respond(0, &[]),
            (cmd::READ, cmdtype::THERMAL_PROFILE) => match state.thermal_code {
                Some(code) => respond(0, &code.to_le_bytes()),
                None => respond(status::UNKNOWN_CMDTYPE, &[]),
            },
            (cmd::WRITE, cmdtype::THERMAL_PROFILE) => {
                let mut bytes = [0u8; 4];
                bytes[..payload.len().min(4)].copy_from_slice(&payload[..payload.len().min(4)]);
                state.thermal_code = Some(u32::from_le_bytes(bytes));
                respond(0, &[])
            }
            (cmd::WRITE, cmdtype::BIOS) => respond(0, &[]),
            (cmd::FOURZONE, t) if t == fourzone::COLOR_GET => match &state.fourzone {
                Some(buffer) => respond(0, buffer),
                None => respond(status::UNKNOWN_COMMAND, &[]),
            },
            (cmd::FOURZONE, t) if t == fourzone::COLOR_SET => {
                let mut buffer = [0u8; 128];
                buffer[..payload.len().min(128)]
                    .copy_from_slice(&payload[..payload.len().min(128)]);
                state.fourzone = Some(buffer);
                respond(0, &[])
            }
            (cmd::GM, gm::SYSTEM_DESIGN_DATA) => match state.design_data {
                Some(data) => respond(0, &data),
                None => respond(status::UNKNOWN_CMDTYPE, &[]),
            },
            (cmd::GM, gm::SET_PERFORMANCE_MODE) => {
                if state.fail_performance_mode {
                    respond(status::INVALID_PARAMETERS, &[])
                } else {
                    // The EC mirrors whatever code the firmware applied
                    state.ec[0x95] = payload[1];
                    respond(0, &[])
                }
            }
            (cmd::GM, gm::GPU_MODES_GET) => match state.gpu_modes {
                Some(modes) => respond(0, &modes),
                None => respond(status::UNKNOWN_CMDTYPE, &[]),
            },
            (cmd::GM, gm::GPU_MODES_SET) => {
                let mut modes = [0u8; 4];
                modes.copy_from_slice(&payload[..4]);
                state.gpu_modes = Some(modes);
                respond(0, &[])
            }
            (cmd::GM, gm::SET_POWER_LIMITS) => respond(0, &[]),
            (cmd::GM, gm::FAN_COUNT_GET) => respond(0, &[state.fan_count, 0, 0, 0]),
            (cmd::GM, gm::FAN_SPEED_GET) => {
                let (hi, lo) = state.fan_speed_raw;
                respond(0, &[0, 0, hi, lo])
            }
            (cmd::GM, gm::VICTUS_S_FAN_SPEED_GET) => respond(0, &state.victus_fan_speeds),
            (cmd::GM, gm::FAN_SPEED_MAX_GET) => respond(0, &state.max_fan.to_le_bytes()),
            (cmd::GM, gm::FAN_SPEED_MAX_SET) => {
                let mut bytes = [0u8; 4];
                bytes[..payload.len().min(4)].copy_from_slice(&payload[..payload.len().min(4)]);
                state.max_fan = u32::from_le_bytes(bytes);
                respond(0, &[])
            }
            (cmd::GM, gm::FAN_SPEED_SET) => respond(0, &[]),
            _ => respond(status::UNKNOWN_CMDTYPE, &[]),
        };
        Ok(reply)
    }
}

impl EmbeddedController for FakeFirmware {
    fn read_byte(&self, register: u8) -> Result<u8, TransportError> {
        Ok(self.state.lock().ec[register as usize])
    }

    fn write_byte(&self, register: u8, value: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.ec[register as usize] = value;
        state.ec_writes.push((register, value));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording event sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingEndpoint {
    pub cover_states: Mutex<Vec<bool>>,
}

impl SwitchEndpoint for RecordingEndpoint {
    fn lens_cover_changed(&self, covered: bool) {
        self.cover_states.lock().push(covered);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub keys: Mutex<Vec<(KeyAction, u32)>>,
    pub dock_states: Mutex<Vec<bool>>,
    pub tablet_states: Mutex<Vec<bool>>,
    pub endpoint: Arc<RecordingEndpoint>,
    pub endpoints_created: Mutex<usize>,
}

impl EventSink for RecordingSink {
    fn key_pressed(&self, action: KeyAction, code: u32) {
        self.keys.lock().push((action, code));
    }

    fn dock_changed(&self, docked: bool) {
        self.dock_states.lock().push(docked);
    }

    fn tablet_mode_changed(&self, tablet: bool) {
        self.tablet_states.lock().push(tablet);
    }

    fn camera_shutter_endpoint(&self) -> Result<Arc<dyn SwitchEndpoint>, PlatformError> {
        *self.endpoints_created.lock() += 1;
        Ok(Arc::clone(&self.endpoint) as Arc<dyn SwitchEndpoint>)
    }
}

/// Little-endian words as a notification buffer.
pub fn notification(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Build a 128-byte indexed radio table from (radio_type, rfkill_id, power)
/// records. Bus identity fields get fixed nonzero values so the records do
/// not look like absent slots.
pub fn rfkill2_table(records: &[(u8, u8, u8)]) -> Vec<u8> {
    let mut table = vec![0u8; 128];
    table[7] = records.len() as u8;
    for (i, &(radio_type, rfkill_id, power)) in records.iter().enumerate() {
        let base = 16 + i * 16;
        table[base] = radio_type;
        table[base + 1] = 0x01; // bus_type
        table[base + 2..base + 4].copy_from_slice(&0x103Cu16.to_le_bytes()); // vendor_id
        table[base + 4..base + 6].copy_from_slice(&0x1234u16.to_le_bytes()); // product_id
        table[base + 10] = rfkill_id;
        table[base + 11] = power;
    }
    table
}
