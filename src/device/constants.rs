use std::time::Duration;
use uuid::Uuid;

/**
 * How often a retry-class command is written again while it has not converged.
 */
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: Duration = Duration::from_millis(2000);

/**
 * How long (milliseconds) a read of a characteristic may take.
 */
pub const READ_DEADLINE: Duration = Duration::from_millis(2000);

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: Duration = Duration::from_millis(2000);

/**
 * How long connecting and discovering services may take. Some backends never return from a
 * connect attempt when the device went out of range.
 */
pub const CONNECT_DEADLINE: Duration = Duration::from_millis(15000);

/**
 * How long to scan for the configured device before giving up on this connection attempt.
 */
pub const SCAN_DEADLINE: Duration = Duration::from_millis(10000);

/**
 * How often (milliseconds) to poll the adapters for new peripherals while scanning.
 */
pub const SCAN_POLL_DELAY: Duration = Duration::from_millis(250);

/**
 * Two target temperatures closer than this (°C) are considered equal.
 */
pub const TEMPERATURE_EPSILON: f32 = 0.05;

pub const MIN_TARGET_TEMPERATURE: f32 = 40.0;
pub const MAX_TARGET_TEMPERATURE: f32 = 230.0;
pub const MAX_AUTO_OFF_MINUTES: u16 = 360;
pub const MAX_LED_BRIGHTNESS: u8 = 100;

pub const STORZ_BICKEL_MANUFACTURER_ID: u16 = 1736;
pub const DEVICE_NAME_FRAGMENT: &str = "VOLCANO H";

/**
 * The BLE service holding temperatures, heater/fan switches and the configuration values.
 */
pub const CONTROL_SERVICE: Uuid = Uuid::from_u128(0x10110000_5354_4f52_5a26_4249434b454c);

/**
 * The BLE service holding the status registers and the device information strings.
 */
pub const STATUS_SERVICE: Uuid = Uuid::from_u128(0x10100000_5354_4f52_5a26_4249434b454c);

pub const CURRENT_TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x10110001_5354_4f52_5a26_4249434b454c);
pub const TARGET_TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x10110003_5354_4f52_5a26_4249434b454c);
pub const LED_BRIGHTNESS_UUID: Uuid = Uuid::from_u128(0x10110005_5354_4f52_5a26_4249434b454c);
pub const AUTO_OFF_REMAINING_UUID: Uuid = Uuid::from_u128(0x1011000c_5354_4f52_5a26_4249434b454c);
pub const SHUT_OFF_TIME_UUID: Uuid = Uuid::from_u128(0x1011000d_5354_4f52_5a26_4249434b454c);
pub const HEATER_ON_UUID: Uuid = Uuid::from_u128(0x1011000f_5354_4f52_5a26_4249434b454c);
pub const HEATER_OFF_UUID: Uuid = Uuid::from_u128(0x10110010_5354_4f52_5a26_4249434b454c);
pub const FAN_ON_UUID: Uuid = Uuid::from_u128(0x10110013_5354_4f52_5a26_4249434b454c);
pub const FAN_OFF_UUID: Uuid = Uuid::from_u128(0x10110014_5354_4f52_5a26_4249434b454c);
pub const HEAT_HOURS_UUID: Uuid = Uuid::from_u128(0x10110015_5354_4f52_5a26_4249434b454c);
pub const HEAT_MINUTES_UUID: Uuid = Uuid::from_u128(0x10110016_5354_4f52_5a26_4249434b454c);

pub const BOOTLOADER_VERSION_UUID: Uuid = Uuid::from_u128(0x10100001_5354_4f52_5a26_4249434b454c);
pub const FIRMWARE_UUID: Uuid = Uuid::from_u128(0x10100003_5354_4f52_5a26_4249434b454c);
pub const BLE_FIRMWARE_VERSION_UUID: Uuid = Uuid::from_u128(0x10100004_5354_4f52_5a26_4249434b454c);
pub const FIRMWARE_VERSION_UUID: Uuid = Uuid::from_u128(0x10100005_5354_4f52_5a26_4249434b454c);
pub const SERIAL_NUMBER_UUID: Uuid = Uuid::from_u128(0x10100008_5354_4f52_5a26_4249434b454c);
pub const STATUS_REGISTER_1_UUID: Uuid = Uuid::from_u128(0x1010000c_5354_4f52_5a26_4249434b454c);
pub const STATUS_REGISTER_2_UUID: Uuid = Uuid::from_u128(0x1010000d_5354_4f52_5a26_4249434b454c);
pub const STATUS_REGISTER_3_UUID: Uuid = Uuid::from_u128(0x1010000e_5354_4f52_5a26_4249434b454c);

// status register 1
pub const MASK_HEATER_ON: u32 = 0x0020;
pub const MASK_AUTO_OFF_ACTIVE: u32 = 0x0200;
pub const MASK_FAN_ON: u32 = 0x2000;
pub const MASK_STATUS_1_ERROR: u32 = 0x4018;

// status register 2
pub const MASK_FAHRENHEIT: u32 = 0x0200;
pub const MASK_DISPLAY_OFF_ON_COOLING: u32 = 0x1000;
pub const MASK_STATUS_2_ERROR: u32 = 0x003B;

// status register 3
pub const MASK_VIBRATION_OFF: u32 = 0x0400;

/**
 * Writing `mask` to a status register clears those bits, writing `REGISTER_SET_FLAG | mask`
 * sets them.
 */
pub const REGISTER_SET_FLAG: u32 = 0x10000;
