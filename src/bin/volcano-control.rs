use clap::Parser;
use log::{error, info};
use volcano_control::cli::Cli;
use volcano_control::{init_logging, log_level, run};
use volcano_control::error::{AppRunError, ConfigError};

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();
    init_logging(log_level(cli.verbose));
    info!(concat!("volcano-control ", env!("CARGO_PKG_VERSION")));

    match run(cli).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another volcano-control instance is already running");
            std::process::exit(1);
        },
        result => result,
    }
}
