use std::fmt;
use tokio::time::Instant;

use crate::device::codec::{encode, validate_temperature, Characteristic};
use crate::device::constants::TEMPERATURE_EPSILON;
use crate::device::types::{DeviceState, TemperatureUnit};
use crate::error::{CommandAbandoned, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SetTemperature,
    HeaterOn,
    HeaterOff,
    FanOn,
    FanOff,
    SetAutoOff,
    SetLed,
    SetUnit,
    SetVibration,
    SetDisplayOnCooling,
}

/// Commands that drive the same device value. A new command replaces the live command in its
/// slot, which also makes "heater on" supersede a pending "heater off" and the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSlot {
    Temperature,
    Heater,
    Fan,
    AutoOff,
    Led,
    Unit,
    Vibration,
    DisplayOnCooling,
}

impl CommandKind {
    pub fn slot(self) -> CommandSlot {
        match self {
            CommandKind::SetTemperature => CommandSlot::Temperature,
            CommandKind::HeaterOn | CommandKind::HeaterOff => CommandSlot::Heater,
            CommandKind::FanOn | CommandKind::FanOff => CommandSlot::Fan,
            CommandKind::SetAutoOff => CommandSlot::AutoOff,
            CommandKind::SetLed => CommandSlot::Led,
            CommandKind::SetUnit => CommandSlot::Unit,
            CommandKind::SetVibration => CommandSlot::Vibration,
            CommandKind::SetDisplayOnCooling => CommandSlot::DisplayOnCooling,
        }
    }
}

/// What the user wants the device to do, with the desired value in canonical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SetTemperature(f32),
    Heater(bool),
    Fan(bool),
    SetAutoOff(u16),
    SetLed(u8),
    SetUnit(TemperatureUnit),
    SetVibration(bool),
    SetDisplayOnCooling(bool),
}

impl Intent {
    pub fn kind(&self) -> CommandKind {
        match self {
            Intent::SetTemperature(_) => CommandKind::SetTemperature,
            Intent::Heater(true) => CommandKind::HeaterOn,
            Intent::Heater(false) => CommandKind::HeaterOff,
            Intent::Fan(true) => CommandKind::FanOn,
            Intent::Fan(false) => CommandKind::FanOff,
            Intent::SetAutoOff(_) => CommandKind::SetAutoOff,
            Intent::SetLed(_) => CommandKind::SetLed,
            Intent::SetUnit(_) => CommandKind::SetUnit,
            Intent::SetVibration(_) => CommandKind::SetVibration,
            Intent::SetDisplayOnCooling(_) => CommandKind::SetDisplayOnCooling,
        }
    }

    /// The characteristic that reflects this value once the device applied it.
    pub fn readback(&self) -> Characteristic {
        match self {
            Intent::SetTemperature(_) => Characteristic::TargetTemperature,
            Intent::Heater(_) | Intent::Fan(_) => Characteristic::StatusRegister1,
            Intent::SetAutoOff(_) => Characteristic::ShutOffTime,
            Intent::SetLed(_) => Characteristic::LedBrightness,
            Intent::SetUnit(_) | Intent::SetDisplayOnCooling(_) => Characteristic::StatusRegister2,
            Intent::SetVibration(_) => Characteristic::StatusRegister3,
        }
    }

    /// Convergence: the observed state equals the desired value.
    pub fn is_satisfied_by(&self, state: &DeviceState) -> bool {
        match *self {
            Intent::SetTemperature(desired) => state.target_temperature
                .map_or(false, |observed| (observed - desired).abs() < TEMPERATURE_EPSILON),
            Intent::Heater(on) => state.heater_on == Some(on),
            Intent::Fan(on) => state.fan_on == Some(on),
            Intent::SetAutoOff(minutes) => state.auto_off_minutes == Some(minutes),
            Intent::SetLed(percent) => state.led_brightness == Some(percent),
            Intent::SetUnit(unit) => state.temperature_unit == Some(unit),
            Intent::SetVibration(on) => state.vibration_enabled == Some(on),
            Intent::SetDisplayOnCooling(on) => state.display_on_cooling == Some(on),
        }
    }
}

/// A validated intent together with the write that carries it out.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub intent: Intent,
    pub characteristic: Characteristic,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(id: CommandId, intent: Intent) -> Result<Self, ValidationError> {
        let (characteristic, payload) = encode(&intent)?;
        // converge on the value the device will store, which is rounded to tenths
        let intent = match intent {
            Intent::SetTemperature(celsius) => Intent::SetTemperature(f32::from(validate_temperature(celsius)?) / 10.0),
            intent => intent,
        };
        Ok(Command { id, intent, characteristic, payload })
    }

    pub fn kind(&self) -> CommandKind {
        self.intent.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Issued,
    Retrying,
    Confirmed,
    Abandoned,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub command: Command,
    pub state: CommandState,
    pub issued_at: Instant,
    pub attempt_count: u32,
    pub last_attempt_at: Option<Instant>,
    pub next_attempt_at: Option<Instant>,
}

impl PendingCommand {
    pub fn new(command: Command, now: Instant) -> Self {
        PendingCommand {
            command,
            state: CommandState::Issued,
            issued_at: now,
            attempt_count: 0,
            last_attempt_at: None,
            next_attempt_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer command for the same value replaced this one.
    Superseded,
    /// The retry condition no longer holds, e.g. the heater was turned off while the target
    /// temperature was still being written.
    PreconditionLost,
    ConnectionLost,
    NotConnected,
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Confirmed,
    Abandoned(CommandAbandoned),
    Cancelled(CancelReason),
}

impl CommandOutcome {
    pub fn state(&self) -> CommandState {
        match self {
            CommandOutcome::Confirmed => CommandState::Confirmed,
            CommandOutcome::Abandoned(_) => CommandState::Abandoned,
            CommandOutcome::Cancelled(_) => CommandState::Cancelled,
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Confirmed => write!(f, "confirmed"),
            CommandOutcome::Abandoned(reason) => write!(f, "abandoned ({})", reason),
            CommandOutcome::Cancelled(reason) => write!(f, "cancelled ({:?})", reason),
        }
    }
}

/// Published once per command, when it leaves the pending set.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub id: CommandId,
    pub intent: Intent,
    pub outcome: CommandOutcome,
    pub attempts: u32,
}
