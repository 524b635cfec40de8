use std::env;
use log::{info, LevelFilter};

use crate::cli::{Cli, CliCommand};
use crate::config::io::ConfigIO;
use crate::error::AppRunError;

pub mod cli;
pub mod command;
pub mod config;
pub mod control;
pub mod device;
pub mod error;

pub fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init_logging(level: LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(cli.config.as_deref())?;

    // only one instance may own the device at a time
    let mut locker = config_io.locker()?;
    let _lock = locker.lock()?;
    let mut config = config_io.read().await?;

    match cli.command {
        CliCommand::Scan { seconds } => cli::scan(seconds).await,
        CliCommand::Pair { address } => {
            info!("Pairing with {}", address);
            config.device_address = Some(address);
            config_io.save(&config).await?;
            Ok(())
        },
        CliCommand::Forget => {
            info!("Forgetting {}", config.device_address.as_deref().unwrap_or("nothing"));
            config.device_address = None;
            config_io.save(&config).await?;
            Ok(())
        },
        command => {
            let address = cli.address
                .or(config.device_address.clone())
                .ok_or(AppRunError::NoAddress)?;
            cli::control(command, address, config.supervisor_settings()).await
        },
    }
}
