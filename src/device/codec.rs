//! Conversion between characteristic payloads and domain values.
//!
//! All numbers on the wire are little-endian. Temperatures are unsigned tenths of a degree
//! Celsius, switches are written as a single byte to a dedicated "on" or "off" characteristic
//! and read back through the status registers, and the status registers are changed by writing
//! a mask with or without [`REGISTER_SET_FLAG`].

use std::str;
use uuid::Uuid;

use crate::command::types::Intent;
use crate::device::constants::*;
use crate::device::types::TemperatureUnit;
use crate::error::{ProtocolError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    CurrentTemperature,
    TargetTemperature,
    LedBrightness,
    AutoOffRemaining,
    ShutOffTime,
    HeaterOn,
    HeaterOff,
    FanOn,
    FanOff,
    HeatHours,
    HeatMinutes,
    StatusRegister1,
    StatusRegister2,
    StatusRegister3,
    SerialNumber,
    FirmwareVersion,
    BleFirmwareVersion,
    BootloaderVersion,
    Firmware,
}

impl Characteristic {
    /// Every known characteristic. Status register 1 comes first so that the heater and fan
    /// state is known before anything else while seeding.
    pub const ALL: [Characteristic; 19] = [
        Characteristic::StatusRegister1,
        Characteristic::CurrentTemperature,
        Characteristic::TargetTemperature,
        Characteristic::StatusRegister2,
        Characteristic::StatusRegister3,
        Characteristic::AutoOffRemaining,
        Characteristic::ShutOffTime,
        Characteristic::LedBrightness,
        Characteristic::HeatHours,
        Characteristic::HeatMinutes,
        Characteristic::HeaterOn,
        Characteristic::HeaterOff,
        Characteristic::FanOn,
        Characteristic::FanOff,
        Characteristic::SerialNumber,
        Characteristic::FirmwareVersion,
        Characteristic::BleFirmwareVersion,
        Characteristic::BootloaderVersion,
        Characteristic::Firmware,
    ];

    pub fn uuid(self) -> Uuid {
        match self {
            Characteristic::CurrentTemperature => CURRENT_TEMPERATURE_UUID,
            Characteristic::TargetTemperature => TARGET_TEMPERATURE_UUID,
            Characteristic::LedBrightness => LED_BRIGHTNESS_UUID,
            Characteristic::AutoOffRemaining => AUTO_OFF_REMAINING_UUID,
            Characteristic::ShutOffTime => SHUT_OFF_TIME_UUID,
            Characteristic::HeaterOn => HEATER_ON_UUID,
            Characteristic::HeaterOff => HEATER_OFF_UUID,
            Characteristic::FanOn => FAN_ON_UUID,
            Characteristic::FanOff => FAN_OFF_UUID,
            Characteristic::HeatHours => HEAT_HOURS_UUID,
            Characteristic::HeatMinutes => HEAT_MINUTES_UUID,
            Characteristic::StatusRegister1 => STATUS_REGISTER_1_UUID,
            Characteristic::StatusRegister2 => STATUS_REGISTER_2_UUID,
            Characteristic::StatusRegister3 => STATUS_REGISTER_3_UUID,
            Characteristic::SerialNumber => SERIAL_NUMBER_UUID,
            Characteristic::FirmwareVersion => FIRMWARE_VERSION_UUID,
            Characteristic::BleFirmwareVersion => BLE_FIRMWARE_VERSION_UUID,
            Characteristic::BootloaderVersion => BOOTLOADER_VERSION_UUID,
            Characteristic::Firmware => FIRMWARE_UUID,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Characteristic> {
        Characteristic::ALL.into_iter().find(|characteristic| characteristic.uuid() == uuid)
    }

    /// Whether the device pushes changes of this characteristic.
    pub fn notifies(self) -> bool {
        matches!(
            self,
            Characteristic::StatusRegister1
                | Characteristic::StatusRegister2
                | Characteristic::StatusRegister3
                | Characteristic::CurrentTemperature
                | Characteristic::TargetTemperature
                | Characteristic::AutoOffRemaining
                | Characteristic::HeatHours
                | Characteristic::HeatMinutes
        )
    }

    pub fn readable(self) -> bool {
        !matches!(
            self,
            Characteristic::HeaterOn | Characteristic::HeaterOff | Characteristic::FanOn | Characteristic::FanOff
        )
    }

    /// Without these the device can not be controlled, so a connection lacking them is useless.
    pub fn required(self) -> bool {
        matches!(
            self,
            Characteristic::CurrentTemperature
                | Characteristic::TargetTemperature
                | Characteristic::HeaterOn
                | Characteristic::HeaterOff
                | Characteristic::FanOn
                | Characteristic::FanOff
                | Characteristic::StatusRegister1
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub heater_on: bool,
    pub fan_on: bool,
    pub auto_off_active: bool,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub unit: TemperatureUnit,
    pub display_on_cooling: bool,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainValue {
    CurrentTemperature(f32),
    TargetTemperature(f32),
    Status(Status),
    Display(DisplaySettings),
    VibrationEnabled(bool),
    AutoOffRemaining(u32),
    AutoOffMinutes(u16),
    LedBrightness(u8),
    HeatHours(u32),
    HeatMinutes(u8),
    SerialNumber(String),
    FirmwareVersion(String),
    BleFirmwareVersion(String),
    BootloaderVersion(String),
    Firmware(String),
}

fn read_le(characteristic: Characteristic, bytes: &[u8], min_len: usize) -> Result<u32, ProtocolError> {
    if bytes.len() < min_len || bytes.len() > 4 {
        return Err(ProtocolError::Length { characteristic, actual: bytes.len() });
    }

    Ok(bytes.iter().rev().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
}

fn read_temperature(characteristic: Characteristic, bytes: &[u8]) -> Result<f32, ProtocolError> {
    let tenths = read_le(characteristic, bytes, 2)?;
    Ok(tenths as f32 / 10.0)
}

fn read_text(characteristic: Characteristic, bytes: &[u8]) -> Result<String, ProtocolError> {
    let text = str::from_utf8(bytes).map_err(|source| ProtocolError::Utf8 { characteristic, source })?;
    Ok(text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace()).trim_start().to_string())
}

pub fn decode(characteristic: Characteristic, bytes: &[u8]) -> Result<DomainValue, ProtocolError> {
    let value = match characteristic {
        Characteristic::CurrentTemperature => {
            DomainValue::CurrentTemperature(read_temperature(characteristic, bytes)?)
        },
        Characteristic::TargetTemperature => {
            DomainValue::TargetTemperature(read_temperature(characteristic, bytes)?)
        },
        Characteristic::StatusRegister1 => {
            let bits = read_le(characteristic, bytes, 2)?;
            DomainValue::Status(Status {
                heater_on: bits & MASK_HEATER_ON != 0,
                fan_on: bits & MASK_FAN_ON != 0,
                auto_off_active: bits & MASK_AUTO_OFF_ACTIVE != 0,
                error: bits & MASK_STATUS_1_ERROR != 0,
            })
        },
        Characteristic::StatusRegister2 => {
            let bits = read_le(characteristic, bytes, 2)?;
            let unit = if bits & MASK_FAHRENHEIT != 0 {
                TemperatureUnit::Fahrenheit
            } else {
                TemperatureUnit::Celsius
            };
            DomainValue::Display(DisplaySettings {
                unit,
                display_on_cooling: bits & MASK_DISPLAY_OFF_ON_COOLING == 0,
                error: bits & MASK_STATUS_2_ERROR != 0,
            })
        },
        Characteristic::StatusRegister3 => {
            let bits = read_le(characteristic, bytes, 2)?;
            DomainValue::VibrationEnabled(bits & MASK_VIBRATION_OFF == 0)
        },
        Characteristic::AutoOffRemaining => {
            DomainValue::AutoOffRemaining(read_le(characteristic, bytes, 2)?)
        },
        Characteristic::ShutOffTime => {
            let seconds = read_le(characteristic, bytes, 2)?;
            let minutes = u16::try_from(seconds / 60)
                .map_err(|_| ProtocolError::OutOfRange { characteristic, value: seconds })?;
            DomainValue::AutoOffMinutes(minutes)
        },
        Characteristic::LedBrightness => {
            let brightness = read_le(characteristic, bytes, 2)?;
            if brightness > u32::from(MAX_LED_BRIGHTNESS) {
                return Err(ProtocolError::OutOfRange { characteristic, value: brightness });
            }
            DomainValue::LedBrightness(brightness as u8)
        },
        Characteristic::HeatHours => DomainValue::HeatHours(read_le(characteristic, bytes, 2)?),
        Characteristic::HeatMinutes => {
            let minutes = read_le(characteristic, bytes, 1)?;
            if minutes > 59 {
                return Err(ProtocolError::OutOfRange { characteristic, value: minutes });
            }
            DomainValue::HeatMinutes(minutes as u8)
        },
        Characteristic::SerialNumber => DomainValue::SerialNumber(read_text(characteristic, bytes)?),
        Characteristic::FirmwareVersion => DomainValue::FirmwareVersion(read_text(characteristic, bytes)?),
        Characteristic::BleFirmwareVersion => DomainValue::BleFirmwareVersion(read_text(characteristic, bytes)?),
        Characteristic::BootloaderVersion => DomainValue::BootloaderVersion(read_text(characteristic, bytes)?),
        Characteristic::Firmware => DomainValue::Firmware(read_text(characteristic, bytes)?),
        Characteristic::HeaterOn | Characteristic::HeaterOff | Characteristic::FanOn | Characteristic::FanOff => {
            return Err(ProtocolError::NotReadable { characteristic });
        },
    };

    Ok(value)
}

fn register_write(mask: u32, set: bool) -> Vec<u8> {
    let value = if set { REGISTER_SET_FLAG | mask } else { mask };
    value.to_le_bytes().to_vec()
}

pub fn validate_temperature(celsius: f32) -> Result<u16, ValidationError> {
    if !celsius.is_finite() {
        return Err(ValidationError::NotFinite { field: "target temperature" });
    }

    if !(MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(&celsius) {
        return Err(ValidationError::OutOfRange {
            field: "target temperature",
            value: format!("{}", celsius),
            min: format!("{}", MIN_TARGET_TEMPERATURE),
            max: format!("{}", MAX_TARGET_TEMPERATURE),
        });
    }

    Ok((celsius * 10.0).round() as u16)
}

/// Builds the write for an intent. Fails without side effects when the value is not supported
/// by the device.
pub fn encode(intent: &Intent) -> Result<(Characteristic, Vec<u8>), ValidationError> {
    let encoded = match *intent {
        Intent::SetTemperature(celsius) => {
            let tenths = validate_temperature(celsius)?;
            (Characteristic::TargetTemperature, tenths.to_le_bytes().to_vec())
        },
        Intent::Heater(true) => (Characteristic::HeaterOn, vec![1]),
        Intent::Heater(false) => (Characteristic::HeaterOff, vec![0]),
        Intent::Fan(true) => (Characteristic::FanOn, vec![1]),
        Intent::Fan(false) => (Characteristic::FanOff, vec![0]),
        Intent::SetAutoOff(minutes) => {
            if minutes > MAX_AUTO_OFF_MINUTES {
                return Err(ValidationError::OutOfRange {
                    field: "auto-off minutes",
                    value: minutes.to_string(),
                    min: "0".to_string(),
                    max: MAX_AUTO_OFF_MINUTES.to_string(),
                });
            }
            (Characteristic::ShutOffTime, (minutes * 60).to_le_bytes().to_vec())
        },
        Intent::SetLed(percent) => {
            if percent > MAX_LED_BRIGHTNESS {
                return Err(ValidationError::OutOfRange {
                    field: "LED brightness",
                    value: percent.to_string(),
                    min: "0".to_string(),
                    max: MAX_LED_BRIGHTNESS.to_string(),
                });
            }
            (Characteristic::LedBrightness, u16::from(percent).to_le_bytes().to_vec())
        },
        Intent::SetUnit(unit) => (
            Characteristic::StatusRegister2,
            register_write(MASK_FAHRENHEIT, unit == TemperatureUnit::Fahrenheit),
        ),
        Intent::SetDisplayOnCooling(on) => (
            Characteristic::StatusRegister2,
            register_write(MASK_DISPLAY_OFF_ON_COOLING, !on),
        ),
        Intent::SetVibration(on) => (
            Characteristic::StatusRegister3,
            register_write(MASK_VIBRATION_OFF, !on),
        ),
    };

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_register_write(register: u32, payload: &[u8]) -> u32 {
        let write = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mask = write & !REGISTER_SET_FLAG;
        if write & REGISTER_SET_FLAG != 0 { register | mask } else { register & !mask }
    }

    #[test]
    fn test_temperature_limits_round_trip() {
        for celsius in [MIN_TARGET_TEMPERATURE, 185.5, MAX_TARGET_TEMPERATURE] {
            let (characteristic, bytes) = encode(&Intent::SetTemperature(celsius)).unwrap();
            assert_eq!(characteristic, Characteristic::TargetTemperature);
            assert_eq!(decode(characteristic, &bytes).unwrap(), DomainValue::TargetTemperature(celsius));
        }
    }

    #[test]
    fn test_temperature_out_of_range() {
        assert!(matches!(
            encode(&Intent::SetTemperature(39.9)),
            Err(ValidationError::OutOfRange { field: "target temperature", .. })
        ));
        assert!(encode(&Intent::SetTemperature(230.1)).is_err());
        assert_eq!(
            encode(&Intent::SetTemperature(f32::NAN)),
            Err(ValidationError::NotFinite { field: "target temperature" })
        );
    }

    #[test]
    fn test_temperature_accepts_four_byte_payloads() {
        let bytes = 1853u32.to_le_bytes();
        assert_eq!(
            decode(Characteristic::CurrentTemperature, &bytes).unwrap(),
            DomainValue::CurrentTemperature(185.3)
        );
    }

    #[test]
    fn test_short_and_long_payloads() {
        assert_eq!(
            decode(Characteristic::CurrentTemperature, &[0x10]),
            Err(ProtocolError::Length { characteristic: Characteristic::CurrentTemperature, actual: 1 })
        );
        assert!(decode(Characteristic::StatusRegister1, &[0, 0, 0, 0, 0]).is_err());
        assert!(decode(Characteristic::HeatMinutes, &[]).is_err());
    }

    #[test]
    fn test_led_brightness() {
        assert_eq!(encode(&Intent::SetLed(100)).unwrap(), (Characteristic::LedBrightness, vec![100, 0]));
        assert_eq!(
            decode(Characteristic::LedBrightness, &[0, 0]).unwrap(),
            DomainValue::LedBrightness(0)
        );
        assert!(matches!(encode(&Intent::SetLed(150)), Err(ValidationError::OutOfRange { .. })));
        assert!(matches!(
            decode(Characteristic::LedBrightness, &[101, 0]),
            Err(ProtocolError::OutOfRange { value: 101, .. })
        ));
    }

    #[test]
    fn test_led_limits_round_trip() {
        for percent in [0, MAX_LED_BRIGHTNESS] {
            let (characteristic, bytes) = encode(&Intent::SetLed(percent)).unwrap();
            assert_eq!(decode(characteristic, &bytes).unwrap(), DomainValue::LedBrightness(percent));
        }
    }

    #[test]
    fn test_display_on_cooling_round_trip() {
        // start from the opposite state so each write has to flip the bit
        for (on, register) in [(true, MASK_DISPLAY_OFF_ON_COOLING), (false, 0)] {
            let (characteristic, bytes) = encode(&Intent::SetDisplayOnCooling(on)).unwrap();
            let register = apply_register_write(register, &bytes);
            match decode(characteristic, &register.to_le_bytes()).unwrap() {
                DomainValue::Display(display) => {
                    assert_eq!(display.display_on_cooling, on);
                    assert_eq!(display.unit, TemperatureUnit::Celsius);
                },
                other => panic!("unexpected value {:?}", other),
            }
        }
    }

    #[test]
    fn test_auto_off_minutes_are_sent_as_seconds() {
        let (characteristic, bytes) = encode(&Intent::SetAutoOff(MAX_AUTO_OFF_MINUTES)).unwrap();
        assert_eq!(bytes, 21600u16.to_le_bytes().to_vec());
        assert_eq!(decode(characteristic, &bytes).unwrap(), DomainValue::AutoOffMinutes(360));

        let (_, bytes) = encode(&Intent::SetAutoOff(0)).unwrap();
        assert_eq!(decode(characteristic, &bytes).unwrap(), DomainValue::AutoOffMinutes(0));

        assert!(encode(&Intent::SetAutoOff(361)).is_err());
    }

    #[test]
    fn test_status_register_1() {
        let bits = (MASK_HEATER_ON | MASK_AUTO_OFF_ACTIVE).to_le_bytes();
        assert_eq!(
            decode(Characteristic::StatusRegister1, &bits).unwrap(),
            DomainValue::Status(Status { heater_on: true, fan_on: false, auto_off_active: true, error: false })
        );

        let bits = (MASK_FAN_ON as u16).to_le_bytes();
        assert_eq!(
            decode(Characteristic::StatusRegister1, &bits).unwrap(),
            DomainValue::Status(Status { heater_on: false, fan_on: true, auto_off_active: false, error: false })
        );
    }

    #[test]
    fn test_switches_use_dedicated_characteristics() {
        assert_eq!(encode(&Intent::Heater(true)).unwrap(), (Characteristic::HeaterOn, vec![1]));
        assert_eq!(encode(&Intent::Heater(false)).unwrap(), (Characteristic::HeaterOff, vec![0]));
        assert_eq!(encode(&Intent::Fan(true)).unwrap(), (Characteristic::FanOn, vec![1]));
        assert_eq!(encode(&Intent::Fan(false)).unwrap(), (Characteristic::FanOff, vec![0]));
        assert_eq!(
            decode(Characteristic::HeaterOn, &[1]),
            Err(ProtocolError::NotReadable { characteristic: Characteristic::HeaterOn })
        );
    }

    #[test]
    fn test_unit_register_write() {
        let (characteristic, bytes) = encode(&Intent::SetUnit(TemperatureUnit::Fahrenheit)).unwrap();
        assert_eq!(characteristic, Characteristic::StatusRegister2);
        assert_eq!(bytes, vec![0x00, 0x02, 0x01, 0x00]);

        let register = apply_register_write(0, &bytes);
        match decode(characteristic, &register.to_le_bytes()).unwrap() {
            DomainValue::Display(display) => assert_eq!(display.unit, TemperatureUnit::Fahrenheit),
            other => panic!("unexpected value {:?}", other),
        }

        let (_, bytes) = encode(&Intent::SetUnit(TemperatureUnit::Celsius)).unwrap();
        let register = apply_register_write(register, &bytes);
        match decode(characteristic, &register.to_le_bytes()).unwrap() {
            DomainValue::Display(display) => assert_eq!(display.unit, TemperatureUnit::Celsius),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_inverted_register_bits() {
        let (characteristic, bytes) = encode(&Intent::SetVibration(false)).unwrap();
        let register = apply_register_write(0, &bytes);
        assert_eq!(register, MASK_VIBRATION_OFF);
        assert_eq!(decode(characteristic, &register.to_le_bytes()).unwrap(), DomainValue::VibrationEnabled(false));

        let (_, bytes) = encode(&Intent::SetVibration(true)).unwrap();
        let register = apply_register_write(register, &bytes);
        assert_eq!(decode(characteristic, &register.to_le_bytes()).unwrap(), DomainValue::VibrationEnabled(true));

        let (characteristic, bytes) = encode(&Intent::SetDisplayOnCooling(false)).unwrap();
        let register = apply_register_write(0, &bytes);
        match decode(characteristic, &register.to_le_bytes()).unwrap() {
            DomainValue::Display(display) => assert!(!display.display_on_cooling),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(
            decode(Characteristic::SerialNumber, b"VH123456\0\0 ").unwrap(),
            DomainValue::SerialNumber("VH123456".to_string())
        );
        assert!(matches!(
            decode(Characteristic::FirmwareVersion, &[0xff, 0xfe]),
            Err(ProtocolError::Utf8 { .. })
        ));
    }

    #[test]
    fn test_firmware_is_separate_from_firmware_version() {
        assert_eq!(Characteristic::from_uuid(FIRMWARE_UUID), Some(Characteristic::Firmware));
        assert_ne!(FIRMWARE_UUID, FIRMWARE_VERSION_UUID);
        assert!(Characteristic::Firmware.readable());
        assert!(!Characteristic::Firmware.notifies());
        assert_eq!(
            decode(Characteristic::Firmware, b" VH-FW 2.1\r\n").unwrap(),
            DomainValue::Firmware("VH-FW 2.1".to_string())
        );
    }

    #[test]
    fn test_unknown_uuid() {
        assert_eq!(Characteristic::from_uuid(Uuid::nil()), None);
        assert_eq!(
            Characteristic::from_uuid(STATUS_REGISTER_1_UUID),
            Some(Characteristic::StatusRegister1)
        );
    }
}
