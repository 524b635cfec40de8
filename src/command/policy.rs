//! Per-kind retry policy.
//!
//! | Kind                                   | Retries                                     |
//! |----------------------------------------|---------------------------------------------|
//! | SetTemperature                         | every second while the heater is on         |
//! | HeaterOff, FanOff                      | every second until the device reports off   |
//! | HeaterOn, FanOn and all other settings | never, a single attempt                     |

use std::time::Duration;

use crate::command::types::CommandKind;
use crate::device::constants::RETRY_INTERVAL;
use crate::device::types::DeviceState;

#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// `None` allows a single attempt only.
    pub interval: Option<Duration>,
    /// Retries continue only while this holds; once it stops holding the command is cancelled.
    pub retry_while: fn(&DeviceState) -> bool,
}

impl RetryPolicy {
    pub fn retries(&self) -> bool {
        self.interval.is_some()
    }
}

fn always(_: &DeviceState) -> bool {
    true
}

fn heater_on(state: &DeviceState) -> bool {
    state.heater_on == Some(true)
}

fn heater_not_off(state: &DeviceState) -> bool {
    state.heater_on != Some(false)
}

fn fan_not_off(state: &DeviceState) -> bool {
    state.fan_on != Some(false)
}

const SINGLE_ATTEMPT: RetryPolicy = RetryPolicy { interval: None, retry_while: always };

pub fn policy(kind: CommandKind) -> RetryPolicy {
    match kind {
        CommandKind::SetTemperature => RetryPolicy { interval: Some(RETRY_INTERVAL), retry_while: heater_on },
        CommandKind::HeaterOff => RetryPolicy { interval: Some(RETRY_INTERVAL), retry_while: heater_not_off },
        CommandKind::FanOff => RetryPolicy { interval: Some(RETRY_INTERVAL), retry_while: fan_not_off },
        CommandKind::HeaterOn
        | CommandKind::FanOn
        | CommandKind::SetAutoOff
        | CommandKind::SetLed
        | CommandKind::SetUnit
        | CommandKind::SetVibration
        | CommandKind::SetDisplayOnCooling => SINGLE_ATTEMPT,
    }
}
