use std::fmt;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use crate::command::types::CommandEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Converts a canonical (°C) temperature into this display unit.
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// Converts a temperature in this display unit back to canonical °C.
    pub fn to_celsius(self, value: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub ble_firmware_version: Option<String>,
    pub bootloader_version: Option<String>,
    pub firmware: Option<String>,
}

/// Last known values of the device. All temperatures are in °C regardless of
/// `temperature_unit`, which only tells what the device itself displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub heater_on: Option<bool>,
    pub fan_on: Option<bool>,
    pub auto_off_active: Option<bool>,
    pub auto_off_minutes: Option<u16>,
    pub auto_off_remaining_seconds: Option<u32>,
    /// Seconds since the auto shut-off timer started, while it is running.
    pub current_on_time_seconds: Option<u32>,
    pub led_brightness: Option<u8>,
    pub temperature_unit: Option<TemperatureUnit>,
    pub display_on_cooling: Option<bool>,
    pub vibration_enabled: Option<bool>,
    pub heat_hours: Option<u32>,
    pub heat_minutes: Option<u8>,
    pub total_heating_seconds: Option<u64>,
    pub register_1_error: Option<bool>,
    pub register_2_error: Option<bool>,
    /// Either status register reports an error.
    pub device_error: Option<bool>,
    pub info: DeviceInfo,
    pub connected: bool,
    pub last_rssi: Option<i16>,
    pub last_updated: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StateField {
    CurrentTemperature,
    TargetTemperature,
    HeaterOn,
    FanOn,
    AutoOffActive,
    AutoOffMinutes,
    AutoOffRemaining,
    CurrentOnTime,
    LedBrightness,
    TemperatureUnit,
    DisplayOnCooling,
    VibrationEnabled,
    HeatHours,
    HeatMinutes,
    TotalHeatingTime,
    Register1Error,
    Register2Error,
    DeviceError,
    Info,
    Connected,
    Rssi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Discovering,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Discovering => "discovering",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    ConnectionChanged(ConnectionStatus),
    StateChanged {
        changed: Vec<StateField>,
        state: DeviceState,
    },
    Command(CommandEvent),
}
