use clap::Parser;
use std::path::PathBuf;

/// fan_thermald — closed-loop fan speed controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $FAN_THERMALD_CONFIG, then XDG, then /etc)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Log at debug level
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,

    /// Do not export the D-Bus control interface
    #[arg(long = "no-dbus", default_value = "false")]
    pub no_dbus: bool,
}
