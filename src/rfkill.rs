//! Radio-block state synchronization
//!
//! Two incompatible firmware generations report radio state. The legacy
//! protocol packs up to three radio kinds into one bitmask word; newer
//! firmware exposes an indexed table of up to seven device records. Both are
//! implementations of one [`RadioBank`] interface, and setup tries one then
//! the other, preferring the indexed table on 2009-or-later firmware.
//!
//! Firmware is the source of truth. Cached toggle state is re-derived from
//! fresh reads on every notification and on resume; two refreshes racing on
//! the same toggle is a benign last-write-wins race because both derive from
//! independent firmware reads.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use hpwmi_transport::protocol::{cmd, cmdtype, wireless};
use hpwmi_transport::RadioKind;

use crate::error::PlatformError;
use crate::HpWmi;

/// Maximum number of records in the indexed device table.
pub const MAX_INDEXED_DEVICES: usize = 7;

/// Stable id marking an absent table slot.
const ABSENT_ID: u8 = 0xFF;

/// Wire size of the indexed device table.
const TABLE_SIZE: usize = 128;

/// Block state of one radio. "Blocked" is the logical negation of the
/// firmware's power bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RadioState {
    pub soft_blocked: bool,
    pub hard_blocked: bool,
}

/// One exposed radio toggle and its last synchronized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadioEntry {
    pub kind: RadioKind,
    pub state: RadioState,
}

/// A radio state provider: one per firmware enumeration generation.
pub trait RadioBank: Send + Sync {
    /// Re-read firmware state and update every toggle that can be trusted.
    fn refresh(&self) -> Result<(), PlatformError>;

    /// Cached state of all registered toggles.
    fn snapshot(&self) -> Vec<RadioEntry>;

    /// Block or unblock the toggle at `position` (its index in `snapshot`).
    fn set_block(&self, position: usize, blocked: bool) -> Result<(), PlatformError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn position_error(position: usize) -> PlatformError {
    PlatformError::InvalidParameter(format!("no radio toggle at position {position}"))
}

// ---------------------------------------------------------------------------
// Legacy bitmask generation
// ---------------------------------------------------------------------------

/// Legacy protocol: one wireless word carries presence and block bits for up
/// to three radio kinds.
pub struct LegacyRadioBank {
    wmi: Arc<HpWmi>,
    toggles: Mutex<Vec<RadioEntry>>,
}

impl LegacyRadioBank {
    /// Read the wireless word and register a toggle per present radio kind.
    /// A zero present-mask is a valid, empty bank.
    pub fn setup(wmi: Arc<HpWmi>) -> Result<Self, PlatformError> {
        let word = wmi.read_int(cmdtype::WIRELESS)?;

        // Write the word back to acknowledge; some firmware needs this to
        // arm change notifications.
        if let Err(e) = wmi.write_query(cmdtype::WIRELESS, &word.to_le_bytes()) {
            warn!("failed to acknowledge wireless query: {e}");
        }

        let mut toggles = Vec::new();
        for kind in RadioKind::LEGACY {
            if word & (1 << kind as u32) != 0 {
                toggles.push(RadioEntry {
                    kind,
                    state: Self::state_from_word(word, kind),
                });
            }
        }
        Ok(Self {
            wmi,
            toggles: Mutex::new(toggles),
        })
    }

    fn state_from_word(word: u32, kind: RadioKind) -> RadioState {
        RadioState {
            soft_blocked: word & wireless::soft_block_mask(kind) == 0,
            hard_blocked: word & wireless::hard_block_mask(kind) == 0,
        }
    }
}

impl RadioBank for LegacyRadioBank {
    fn refresh(&self) -> Result<(), PlatformError> {
        let word = self.wmi.read_int(cmdtype::WIRELESS)?;
        let mut toggles = self.toggles.lock();
        for toggle in toggles.iter_mut() {
            toggle.state = Self::state_from_word(word, toggle.kind);
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<RadioEntry> {
        self.toggles.lock().clone()
    }

    fn set_block(&self, position: usize, blocked: bool) -> Result<(), PlatformError> {
        let kind = {
            let toggles = self.toggles.lock();
            toggles
                .get(position)
                .ok_or_else(|| position_error(position))?
                .kind
        };
        // Kind selector in the high byte, desired power state at the kind's bit.
        let value = (1u32 << (kind as u32 + 8)) | (u32::from(!blocked) << kind as u32);
        self.wmi.write_query(cmdtype::WIRELESS, &value.to_le_bytes())?;
        self.toggles.lock()[position].state.soft_blocked = blocked;
        Ok(())
    }

    fn len(&self) -> usize {
        self.toggles.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Indexed-table generation
// ---------------------------------------------------------------------------

/// One record of the indexed device table.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct DeviceRecord {
    radio_type: u8,
    bus_type: u8,
    vendor_id: U16,
    product_id: U16,
    subsys_vendor_id: U16,
    subsys_product_id: U16,
    rfkill_id: u8,
    power: u8,
    _reserved: [u8; 4],
}

/// The full 128-byte table: count byte plus up to seven records.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct DeviceTable {
    _reserved: [u8; 7],
    count: u8,
    _pad: [u8; 8],
    devices: [DeviceRecord; MAX_INDEXED_DEVICES],
}

impl DeviceRecord {
    fn state(&self) -> RadioState {
        RadioState {
            soft_blocked: wireless::is_sw_blocked(self.power),
            hard_blocked: wireless::is_hw_blocked(self.power),
        }
    }

    /// An all-zero bus identity with the absent stable id marks an empty slot.
    fn is_absent(&self) -> bool {
        self.vendor_id.get() == 0 && self.product_id.get() == 0 && self.rfkill_id == ABSENT_ID
    }
}

/// A registered device from the indexed table: the firmware's stable id, the
/// table index it was found at, and the exposed toggle.
struct IndexedDevice {
    id: u8,
    index: usize,
    entry: RadioEntry,
}

/// Indexed-table protocol (firmware generation 2+).
pub struct IndexedRadioBank {
    wmi: Arc<HpWmi>,
    devices: Mutex<Vec<IndexedDevice>>,
}

impl IndexedRadioBank {
    pub fn setup(wmi: Arc<HpWmi>) -> Result<Self, PlatformError> {
        let table = Self::read_table(&wmi)?;
        let count = table.count as usize;
        if count > MAX_INDEXED_DEVICES {
            return Err(PlatformError::UnexpectedResponse(format!(
                "device table reports {count} radios, more than the table holds"
            )));
        }

        let mut devices = Vec::new();
        for (index, record) in table.devices[..count].iter().enumerate() {
            let Some(kind) = RadioKind::from_wire(record.radio_type) else {
                warn!(
                    "skipping radio of unknown type {:#x}",
                    record.radio_type
                );
                continue;
            };
            if record.is_absent() {
                continue;
            }
            if record.power & wireless::POWER_BIOS == 0 {
                info!("radio {kind} (id {:#x}) is BIOS blocked", record.rfkill_id);
            }
            devices.push(IndexedDevice {
                id: record.rfkill_id,
                index,
                entry: RadioEntry {
                    kind,
                    state: record.state(),
                },
            });
        }
        Ok(Self {
            wmi,
            devices: Mutex::new(devices),
        })
    }

    fn read_table(wmi: &HpWmi) -> Result<DeviceTable, PlatformError> {
        let raw = wmi.read_query(cmdtype::WIRELESS2, cmd::READ, TABLE_SIZE)?;
        DeviceTable::read_from_bytes(&raw).map_err(|_| {
            PlatformError::UnexpectedResponse("device table has unexpected size".into())
        })
    }
}

impl RadioBank for IndexedRadioBank {
    /// Re-read the table and update each registered device, re-locating it
    /// by table index. A stable-id mismatch means the firmware's enumeration
    /// changed underneath us: that device's state is left untouched rather
    /// than guessed.
    fn refresh(&self) -> Result<(), PlatformError> {
        let table = Self::read_table(&self.wmi)?;
        let count = table.count as usize;
        let mut devices = self.devices.lock();
        for device in devices.iter_mut() {
            if device.index >= count || device.id == ABSENT_ID {
                continue;
            }
            let record = &table.devices[device.index];
            if record.rfkill_id != device.id {
                warn!(
                    "radio device table changed at index {}, leaving state untouched",
                    device.index
                );
                continue;
            }
            device.entry.state = record.state();
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<RadioEntry> {
        self.devices.lock().iter().map(|d| d.entry).collect()
    }

    fn set_block(&self, position: usize, blocked: bool) -> Result<(), PlatformError> {
        let index = {
            let devices = self.devices.lock();
            devices
                .get(position)
                .ok_or_else(|| position_error(position))?
                .index
        };
        let request = [0x01, 0x00, index as u8, u8::from(!blocked)];
        self.wmi.write_query(cmdtype::WIRELESS2, &request)?;
        self.devices.lock()[position].entry.state.soft_blocked = blocked;
        Ok(())
    }

    fn len(&self) -> usize {
        self.devices.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Setup facade
// ---------------------------------------------------------------------------

/// The installed radio bank, whichever generation the firmware offered.
///
/// Setup failures on one path are non-fatal; the other path is attempted.
/// A machine with no radios at all gets an empty block, not an error.
pub struct RadioBlock {
    bank: Option<Box<dyn RadioBank>>,
    indexed: bool,
}

impl RadioBlock {
    pub fn setup(wmi: Arc<HpWmi>) -> Self {
        let prefer_indexed = wmi.bios_2009_later().unwrap_or(false);
        if prefer_indexed {
            Self::try_indexed(&wmi).or_else(|| Self::try_legacy(&wmi)).unwrap_or(Self {
                bank: None,
                indexed: false,
            })
        } else {
            Self::try_legacy(&wmi).or_else(|| Self::try_indexed(&wmi)).unwrap_or(Self {
                bank: None,
                indexed: false,
            })
        }
    }

    fn try_indexed(wmi: &Arc<HpWmi>) -> Option<Self> {
        match IndexedRadioBank::setup(Arc::clone(wmi)) {
            Ok(bank) if !bank.is_empty() => Some(Self {
                bank: Some(Box::new(bank)),
                indexed: true,
            }),
            Ok(_) => {
                info!("no indexed radio devices found");
                None
            }
            Err(e) if e.is_unsupported() => {
                debug!("indexed radio table not supported");
                None
            }
            Err(e) => {
                warn!("indexed radio setup failed: {e}");
                None
            }
        }
    }

    fn try_legacy(wmi: &Arc<HpWmi>) -> Option<Self> {
        match LegacyRadioBank::setup(Arc::clone(wmi)) {
            Ok(bank) => Some(Self {
                bank: Some(Box::new(bank)),
                indexed: false,
            }),
            Err(e) if e.is_unsupported() => {
                debug!("legacy wireless query not supported");
                None
            }
            Err(e) => {
                warn!("legacy radio setup failed: {e}");
                None
            }
        }
    }

    /// True when the installed bank is the indexed-table generation.
    pub fn has_indexed_devices(&self) -> bool {
        self.indexed && self.bank.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn refresh(&self) -> Result<(), PlatformError> {
        match &self.bank {
            Some(bank) => bank.refresh(),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> Vec<RadioEntry> {
        self.bank.as_ref().map(|b| b.snapshot()).unwrap_or_default()
    }

    pub fn set_block(&self, position: usize, blocked: bool) -> Result<(), PlatformError> {
        match &self.bank {
            Some(bank) => bank.set_block(position, blocked),
            None => Err(position_error(position)),
        }
    }

    pub fn len(&self) -> usize {
        self.bank.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
