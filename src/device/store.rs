use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use log::trace;
use uuid::Uuid;

use crate::control::events::EventBus;
use crate::device::codec::{decode, Characteristic, DomainValue};
use crate::device::types::{DeviceEvent, DeviceState, StateField};
use crate::error::ProtocolError;

/// Read-only view on the device state, handed out to collaborators.
#[derive(Clone)]
pub struct StateReader {
    state: Arc<RwLock<DeviceState>>,
}

impl StateReader {
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().expect("Failed to lock DeviceState").clone()
    }
}

/// The only writer of the device state. Owned by the connection supervisor task.
pub struct DeviceStore {
    state: Arc<RwLock<DeviceState>>,
    bus: EventBus,
}

fn update<T: PartialEq>(slot: &mut T, value: T, field: StateField, changed: &mut Vec<StateField>) {
    if *slot != value {
        *slot = value;
        changed.push(field);
    }
}

impl DeviceStore {
    pub fn new(bus: EventBus) -> Self {
        DeviceStore {
            state: Arc::new(RwLock::new(DeviceState::default())),
            bus,
        }
    }

    pub fn reader(&self) -> StateReader {
        StateReader { state: self.state.clone() }
    }

    pub fn snapshot(&self) -> DeviceState {
        self.reader().snapshot()
    }

    /// Decodes a payload received from the device and applies it. Payloads of unknown
    /// characteristics are ignored. On a protocol error the state is left untouched.
    pub fn apply_notification(&mut self, uuid: Uuid, bytes: &[u8]) -> Result<Vec<StateField>, ProtocolError> {
        let characteristic = match Characteristic::from_uuid(uuid) {
            Some(characteristic) => characteristic,
            None => {
                trace!("Ignoring payload of unknown characteristic {}", uuid);
                return Ok(Vec::new());
            },
        };

        let value = decode(characteristic, bytes)?;
        Ok(self.apply_value(value))
    }

    pub fn apply_value(&mut self, value: DomainValue) -> Vec<StateField> {
        self.mutate(|state, changed| {
            match value {
                DomainValue::CurrentTemperature(celsius) => {
                    update(&mut state.current_temperature, Some(celsius), StateField::CurrentTemperature, changed);
                },
                DomainValue::TargetTemperature(celsius) => {
                    update(&mut state.target_temperature, Some(celsius), StateField::TargetTemperature, changed);
                },
                DomainValue::Status(status) => {
                    update(&mut state.heater_on, Some(status.heater_on), StateField::HeaterOn, changed);
                    update(&mut state.fan_on, Some(status.fan_on), StateField::FanOn, changed);
                    update(&mut state.auto_off_active, Some(status.auto_off_active), StateField::AutoOffActive, changed);
                    update(&mut state.register_1_error, Some(status.error), StateField::Register1Error, changed);
                    Self::update_device_error(state, changed);
                },
                DomainValue::Display(display) => {
                    update(&mut state.temperature_unit, Some(display.unit), StateField::TemperatureUnit, changed);
                    update(&mut state.display_on_cooling, Some(display.display_on_cooling), StateField::DisplayOnCooling, changed);
                    update(&mut state.register_2_error, Some(display.error), StateField::Register2Error, changed);
                    Self::update_device_error(state, changed);
                },
                DomainValue::VibrationEnabled(on) => {
                    update(&mut state.vibration_enabled, Some(on), StateField::VibrationEnabled, changed);
                },
                DomainValue::AutoOffRemaining(seconds) => {
                    update(&mut state.auto_off_remaining_seconds, Some(seconds), StateField::AutoOffRemaining, changed);
                    Self::update_on_time(state, changed);
                },
                DomainValue::AutoOffMinutes(minutes) => {
                    update(&mut state.auto_off_minutes, Some(minutes), StateField::AutoOffMinutes, changed);
                    Self::update_on_time(state, changed);
                },
                DomainValue::LedBrightness(percent) => {
                    update(&mut state.led_brightness, Some(percent), StateField::LedBrightness, changed);
                },
                DomainValue::HeatHours(hours) => {
                    update(&mut state.heat_hours, Some(hours), StateField::HeatHours, changed);
                    Self::update_total_heating(state, changed);
                },
                DomainValue::HeatMinutes(minutes) => {
                    update(&mut state.heat_minutes, Some(minutes), StateField::HeatMinutes, changed);
                    Self::update_total_heating(state, changed);
                },
                DomainValue::SerialNumber(text) => {
                    update(&mut state.info.serial_number, Some(text), StateField::Info, changed);
                },
                DomainValue::FirmwareVersion(text) => {
                    update(&mut state.info.firmware_version, Some(text), StateField::Info, changed);
                },
                DomainValue::BleFirmwareVersion(text) => {
                    update(&mut state.info.ble_firmware_version, Some(text), StateField::Info, changed);
                },
                DomainValue::BootloaderVersion(text) => {
                    update(&mut state.info.bootloader_version, Some(text), StateField::Info, changed);
                },
                DomainValue::Firmware(text) => {
                    update(&mut state.info.firmware, Some(text), StateField::Info, changed);
                },
            }
        })
    }

    fn update_total_heating(state: &mut DeviceState, changed: &mut Vec<StateField>) {
        if let (Some(hours), Some(minutes)) = (state.heat_hours, state.heat_minutes) {
            let seconds = (u64::from(hours) * 60 + u64::from(minutes)) * 60;
            update(&mut state.total_heating_seconds, Some(seconds), StateField::TotalHeatingTime, changed);
        }
    }

    fn update_device_error(state: &mut DeviceState, changed: &mut Vec<StateField>) {
        let error = match (state.register_1_error, state.register_2_error) {
            (None, None) => None,
            (first, second) => Some(first.unwrap_or(false) || second.unwrap_or(false)),
        };
        update(&mut state.device_error, error, StateField::DeviceError, changed);
    }

    // only meaningful while the shut-off timer counts down
    fn update_on_time(state: &mut DeviceState, changed: &mut Vec<StateField>) {
        let on_time = match (state.auto_off_minutes, state.auto_off_remaining_seconds) {
            (Some(minutes), Some(remaining)) if remaining > 0 => Some((u32::from(minutes) * 60).saturating_sub(remaining)),
            _ => None,
        };
        update(&mut state.current_on_time_seconds, on_time, StateField::CurrentOnTime, changed);
    }

    /// Values are kept when the link goes down; they are stale until the next seed.
    pub fn set_connected(&mut self, connected: bool) -> Vec<StateField> {
        self.mutate(|state, changed| {
            update(&mut state.connected, connected, StateField::Connected, changed);
        })
    }

    pub fn set_rssi(&mut self, rssi: i16) -> Vec<StateField> {
        self.mutate(|state, changed| {
            update(&mut state.last_rssi, Some(rssi), StateField::Rssi, changed);
        })
    }

    fn mutate<F>(&mut self, f: F) -> Vec<StateField>
    where
        F: FnOnce(&mut DeviceState, &mut Vec<StateField>),
    {
        let mut changed = Vec::new();
        let snapshot = {
            let mut state = self.state.write().expect("Failed to lock DeviceState");
            f(&mut *state, &mut changed);
            if changed.is_empty() {
                return changed;
            }
            state.last_updated = Some(SystemTime::now());
            state.clone()
        };

        self.bus.publish(DeviceEvent::StateChanged { changed: changed.clone(), state: snapshot });
        changed
    }
}
