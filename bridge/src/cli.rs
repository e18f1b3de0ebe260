use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "etrv-bridge")]
#[command(about = "Bridge Danfoss eTRV radiator valves to an MQTT broker")]
pub struct Cli {
    /// JSON config file
    #[arg(short, long, env = "ETRV_CONFIG", default_value = "etrv.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the bridge (default)
    Run,
    /// Print the room temperature of every thermostat
    Temp,
    /// Print the active setpoint of every thermostat
    SetPoint,
    /// Print the battery level of every thermostat
    Battery,
}
