use std::path::PathBuf;
use std::time::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::command::types::{CommandId, CommandOutcome};
use crate::control::controller::VolcanoController;
use crate::control::supervisor::SupervisorSettings;
use crate::device::connection::BtleTransport;
use crate::device::types::{DeviceEvent, DeviceState, TemperatureUnit};
use crate::error::AppRunError;

#[derive(Debug, Parser)]
#[command(name = "volcano-control", version, about = "Control a Volcano Hybrid vaporizer over Bluetooth LE")]
pub struct Cli {
    /// Device address to use instead of the paired one
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Path of the config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More logging; repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitArg {
    Celsius,
    Fahrenheit,
}

impl From<UnitArg> for TemperatureUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Celsius => TemperatureUnit::Celsius,
            UnitArg::Fahrenheit => TemperatureUnit::Fahrenheit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum CliCommand {
    /// List nearby devices
    Scan {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Remember the device to control
    Pair { address: String },
    /// Forget the paired device
    Forget,
    /// Print the device state
    Status,
    /// Print every state change until interrupted
    Monitor,
    /// Set the target temperature
    SetTemp {
        value: f32,
        #[arg(long, value_enum, default_value_t = UnitArg::Celsius)]
        unit: UnitArg,
    },
    Heater {
        #[arg(value_enum)]
        state: Switch,
    },
    Fan {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Set the auto shut-off time in minutes
    AutoOff { minutes: u16 },
    /// Set the display brightness in percent
    Led { percent: u8 },
    /// Set the unit shown on the device display
    Unit {
        #[arg(value_enum)]
        unit: UnitArg,
    },
    Vibration {
        #[arg(value_enum)]
        state: Switch,
    },
    DisplayOnCooling {
        #[arg(value_enum)]
        state: Switch,
    },
}

pub async fn scan(seconds: u64) -> Result<(), AppRunError> {
    let transport = BtleTransport::new().await?;
    info!("Scanning for {} seconds", seconds);

    let devices = transport.scan_for_devices(Duration::from_secs(seconds)).await?;
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

/// Connects to `address`, performs `command` and disconnects again.
pub async fn control(command: CliCommand, address: String, settings: SupervisorSettings) -> Result<(), AppRunError> {
    let transport = BtleTransport::new().await?;
    let (controller, handle) = VolcanoController::spawn(transport, address, settings, CancellationToken::new());
    let mut events = controller.subscribe_state_changes();

    let result = tokio::select! {
        result = perform(&controller, &mut events, command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        },
    };

    if controller.shutdown().is_ok() {
        if let Err(err) = handle.await {
            warn!("Supervisor task failed: {}", err);
        }
    }

    result
}

async fn perform(
    controller: &VolcanoController,
    events: &mut UnboundedReceiver<DeviceEvent>,
    command: CliCommand,
) -> Result<(), AppRunError> {
    wait_until_ready(controller, events).await?;

    let id = match command {
        CliCommand::Status => return print_state(&controller.get_state()),
        CliCommand::Monitor => return monitor(events).await,
        CliCommand::SetTemp { value, unit } => {
            let celsius = TemperatureUnit::from(unit).to_celsius(value);
            // the device works in tenths of a degree
            controller.request_set_temperature((celsius * 10.0).round() / 10.0)?
        },
        CliCommand::Heater { state } => controller.request_heater(state.is_on())?,
        CliCommand::Fan { state } => controller.request_fan(state.is_on())?,
        CliCommand::AutoOff { minutes } => controller.request_set_auto_off(minutes)?,
        CliCommand::Led { percent } => controller.request_set_led(percent)?,
        CliCommand::Unit { unit } => controller.request_set_unit(unit.into())?,
        CliCommand::Vibration { state } => controller.request_set_vibration(state.is_on())?,
        CliCommand::DisplayOnCooling { state } => controller.request_set_display_on_cooling(state.is_on())?,
        // handled without a connection
        CliCommand::Scan { .. } | CliCommand::Pair { .. } | CliCommand::Forget => return Ok(()),
    };

    let outcome = wait_for_outcome(events, id).await?;
    print_state(&controller.get_state())?;

    match outcome {
        CommandOutcome::Confirmed => Ok(()),
        outcome => Err(AppRunError::CommandFailed { outcome }),
    }
}

async fn wait_until_ready(
    controller: &VolcanoController,
    events: &mut UnboundedReceiver<DeviceEvent>,
) -> Result<(), AppRunError> {
    if controller.get_state().connected {
        return Ok(());
    }

    while let Some(event) = events.next().await {
        match event {
            DeviceEvent::StateChanged { state, .. } if state.connected => return Ok(()),
            DeviceEvent::ConnectionChanged(status) => info!("Device is {}", status),
            _ => {},
        }
    }

    Err(AppRunError::SupervisorStopped)
}

async fn wait_for_outcome(
    events: &mut UnboundedReceiver<DeviceEvent>,
    id: CommandId,
) -> Result<CommandOutcome, AppRunError> {
    while let Some(event) = events.next().await {
        match event {
            DeviceEvent::Command(event) if event.id == id => {
                info!("Command {} {} after {} attempt(s)", event.id, event.outcome, event.attempts);
                return Ok(event.outcome);
            },
            DeviceEvent::ConnectionChanged(status) => info!("Device is {}", status),
            _ => {},
        }
    }

    Err(AppRunError::SupervisorStopped)
}

async fn monitor(events: &mut UnboundedReceiver<DeviceEvent>) -> Result<(), AppRunError> {
    while let Some(event) = events.next().await {
        match event {
            DeviceEvent::StateChanged { changed, state } => {
                info!("Changed: {:?}", changed);
                println!("{}", serde_json::to_string(&state)?);
            },
            DeviceEvent::ConnectionChanged(status) => info!("Device is {}", status),
            DeviceEvent::Command(event) => info!("Command {} {}", event.id, event.outcome),
        }
    }

    Ok(())
}

fn print_state(state: &DeviceState) -> Result<(), AppRunError> {
    let unit = state.temperature_unit.unwrap_or(TemperatureUnit::Celsius);
    if let (Some(current), Some(target)) = (state.current_temperature, state.target_temperature) {
        info!("{:.1}{} of {:.1}{}", unit.from_celsius(current), unit, unit.from_celsius(target), unit);
    }

    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}
