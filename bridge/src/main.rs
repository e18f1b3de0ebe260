mod broker;
mod cli;
mod host;
mod transport;

use clap::Parser;

use crate::{
    cli::{Cli, Command},
    host::Reading,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    host::init_tracing();

    let config = host::load_config(&cli.config)?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => host::run(config).await,
        Command::Temp => host::print_readings(&config, Reading::Temperature).await,
        Command::SetPoint => host::print_readings(&config, Reading::SetPoint).await,
        Command::Battery => host::print_readings(&config, Reading::Battery).await,
    }
}
