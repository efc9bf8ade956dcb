//! Asynchronous hardware notification routing
//!
//! The firmware pushes notification buffers from callback context,
//! concurrently with foreground queries. A single entry point decodes each
//! buffer and routes by event id: switch events re-read hardware state,
//! hotkey events translate scancodes, radio events resynchronize the block
//! state, and a long informational tail is observed and logged without
//! driving any state change. Unknown events and malformed buffers are
//! logged and dropped, never fatal.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use hpwmi_transport::{parse_notification, EventId};

use crate::error::PlatformError;
use crate::keymap::{self, KeymapEntry};
use crate::rfkill::RadioBlock;
use crate::{HpWmi, KeyAction, MachineInfo};

/// Event-data values of the camera-toggle notification.
const CAMERA_COVERED: u32 = 0xFF;
const CAMERA_UNCOVERED: u32 = 0xFE;

/// Where translated input events go. The embedder owns the actual input
/// devices; the driver only reports through this seam.
pub trait EventSink: Send + Sync {
    /// A translated hotkey press. `code` is the raw vendor scancode.
    fn key_pressed(&self, action: KeyAction, code: u32);

    fn dock_changed(&self, docked: bool);

    fn tablet_mode_changed(&self, tablet: bool);

    /// Build the camera-shutter switch endpoint. Called at most once, on the
    /// first camera event; machines without the shutter never get one.
    fn camera_shutter_endpoint(&self) -> Result<Arc<dyn SwitchEndpoint>, PlatformError>;
}

/// A dedicated switch-reporting endpoint (the camera lens cover).
pub trait SwitchEndpoint: Send + Sync {
    fn lens_cover_changed(&self, covered: bool);
}

/// Routes decoded notifications into the driver subsystems.
pub struct EventDispatcher {
    wmi: Arc<HpWmi>,
    radios: Arc<RadioBlock>,
    machine: MachineInfo,
    sink: Arc<dyn EventSink>,
    camera_shutter: Mutex<Option<Arc<dyn SwitchEndpoint>>>,
}

impl EventDispatcher {
    pub fn new(
        wmi: Arc<HpWmi>,
        radios: Arc<RadioBlock>,
        machine: MachineInfo,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            wmi,
            radios,
            machine,
            sink,
            camera_shutter: Mutex::new(None),
        }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Decode and route one raw notification buffer.
    pub fn handle(&self, buffer: &[u8]) {
        let notification = match parse_notification(buffer) {
            Ok(n) => n,
            Err(e) => {
                warn!("dropping notification: {e}");
                return;
            }
        };
        let data = notification.data;
        match notification.id {
            EventId::Dock => self.report_switch_states(),
            EventId::BezelButton => match self.wmi.hotkey_code() {
                Ok(code) => self.report_key(code),
                Err(e) => debug!("hotkey re-read failed: {e}"),
            },
            EventId::OmenKey => {
                // The event data usually carries the scancode directly; fall
                // back to the hotkey buffer when it is empty or all-ones.
                let code = if data != 0 && data != u32::MAX {
                    Ok(data)
                } else {
                    self.wmi.hotkey_code()
                };
                match code {
                    Ok(code) => self.report_key(code),
                    Err(e) => debug!("hotkey re-read failed: {e}"),
                }
            }
            EventId::Wireless => {
                if let Err(e) = self.radios.refresh() {
                    warn!("radio state refresh failed: {e}");
                }
            }
            EventId::CameraToggle => self.report_camera_toggle(data),
            EventId::ParkHdd => {}
            EventId::SmartAdapter => debug!("smart adapter event: {data:#x}"),
            EventId::CpuBatteryThrottle => info!("CPU throttled on battery ({data:#x})"),
            EventId::LockSwitch => debug!("lock switch event: {data:#x}"),
            EventId::LidSwitch => debug!("lid switch event: {data:#x}"),
            EventId::ScreenRotation => debug!("screen rotation event: {data:#x}"),
            EventId::CoolsenseMobile => debug!("coolsense mobile event: {data:#x}"),
            EventId::CoolsenseHot => debug!("coolsense hot event: {data:#x}"),
            EventId::ProximitySensor => debug!("proximity sensor event: {data:#x}"),
            EventId::KeyboardBacklight => debug!("keyboard backlight event: {data:#x}"),
            EventId::PeakshiftPeriod => debug!("peakshift period event: {data:#x}"),
            EventId::BatteryChargePeriod => debug!("battery charge period event: {data:#x}"),
            EventId::Sanitization => info!("sanitization mode event: {data:#x}"),
            EventId::SmartExperienceApp => info!("smart experience app event: {data:#x}"),
            EventId::Unknown(id) => info!("unknown event id {id:#x}, data {data:#x}"),
        }
    }

    fn report_switch_states(&self) {
        match self.wmi.dock_state() {
            Ok(docked) => self.sink.dock_changed(docked),
            Err(e) => debug!("dock state read failed: {e}"),
        }
        match self.wmi.tablet_mode(&self.machine) {
            Ok(Some(tablet)) => self.sink.tablet_mode_changed(tablet),
            Ok(None) => {}
            Err(e) => debug!("tablet mode read failed: {e}"),
        }
    }

    fn report_key(&self, code: u32) {
        match keymap::lookup(code) {
            Some(KeymapEntry::Key(action)) => self.sink.key_pressed(action, code),
            Some(KeymapEntry::Ignore) => {}
            None => info!("unknown hotkey code {code:#x}"),
        }
    }

    fn report_camera_toggle(&self, data: u32) {
        let mut endpoint = self.camera_shutter.lock();
        if endpoint.is_none() {
            match self.sink.camera_shutter_endpoint() {
                Ok(created) => *endpoint = Some(created),
                Err(e) => {
                    error!("camera shutter endpoint setup failed: {e}");
                    return;
                }
            }
        }
        let Some(endpoint) = endpoint.as_ref() else {
            return;
        };
        match data {
            CAMERA_COVERED => endpoint.lens_cover_changed(true),
            CAMERA_UNCOVERED => endpoint.lens_cover_changed(false),
            other => warn!("unknown camera shutter state {other:#x}"),
        }
    }
}
