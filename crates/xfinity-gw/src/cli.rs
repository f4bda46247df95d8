//! Clap derive structures for the `xfinity-gw` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// xfinity-gw -- bridge an Xfinity set-top box onto an MQTT bus
#[derive(Debug, Parser)]
#[command(
    name = "xfinity-gw",
    version,
    about = "Bridge an Xfinity set-top box onto an MQTT bus",
    long_about = "Keeps a secure WebSocket session to the box, publishes its state\n\
        and events to MQTT, and forwards authorized controls back to it."
)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "XFINITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration (secrets masked) and exit
    #[arg(long)]
    pub print_config: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, env = "XFINITY_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
