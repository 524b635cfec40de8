use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use uuid::Uuid;
use btleplug;
use serde_json;

use crate::command::types::CommandOutcome;
use crate::device::codec::Characteristic;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

/// Radio or link failure. Always transient; the connection supervisor decides what to do.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter available")]
    NoAdapter,

    #[error("Device {address} was not found while scanning")]
    DeviceNotFound { address: String },

    #[error("Not connected to a device")]
    NotConnected,

    #[error("A required bluetooth characteristic is not available: {uuid}")]
    MissingCharacteristic { uuid: Uuid },

    #[error("Bluetooth operation took too long: {operation}")]
    Timeout { operation: &'static str },
}

/// A payload received from the device that does not match its characteristic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Unexpected payload length {actual} for {characteristic:?}")]
    Length { characteristic: Characteristic, actual: usize },

    #[error("Value {value} out of range for {characteristic:?}")]
    OutOfRange { characteristic: Characteristic, value: u32 },

    #[error("Invalid utf-8 in {characteristic:?}: {source}")]
    Utf8 { characteristic: Characteristic, source: Utf8Error },

    #[error("Characteristic {characteristic:?} is write-only")]
    NotReadable { characteristic: Characteristic },
}

/// A requested value the device does not support. Raised before anything is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: &'static str, value: String, min: String, max: String },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
}

/// Why a single-attempt command gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandAbandoned {
    #[error("write to device failed: {message}")]
    WriteFailed { message: String },

    #[error("device did not confirm the new value")]
    NotConfirmed,
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Invalid request: {source}")]
    Validation { #[from] source: ValidationError },

    #[error("The connection supervisor is no longer running")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    Transport { #[from] source: TransportError },

    #[error("{source}")]
    Control { #[from] source: ControlError },

    #[error("No device address configured; run `scan` and `pair <ADDRESS>` first")]
    NoAddress,

    #[error("The connection supervisor stopped unexpectedly")]
    SupervisorStopped,

    #[error("Command did not complete: {outcome}")]
    CommandFailed { outcome: CommandOutcome },

    #[error("Failed to write output: {source}")]
    Output { #[from] source: serde_json::Error },
}
